pub mod json_repair;
pub mod records;
pub mod response_parser;

pub use records::{cell_text, Record};
pub use response_parser::{parse, ParseFailure};
