// =============================================================================
// INGEST SERVICE
// =============================================================================
//
// Runs one incoming message through the pipeline:
//
//   classify -> extract document text -> ask the model for rows -> parse
//            -> append rows -> mirror the attachment
//
// Every stage failure turns into a notice for the sender and the pipeline
// carries on where it still makes sense. `handle` itself never fails, so one
// bad message cannot take the next one down with it.

use super::attachment_source::AttachmentSource;
use super::ingest_models::{Attachment, IncomingMessage, IngestNotice, IngestReport, MessageKind};
use crate::core::ai::{AiProvider, InferenceService};
use crate::core::extraction::ContentExtractor;
use crate::core::mirror::{FileMirror, FolderNaming};
use crate::core::parsing::{parse, Record};
use crate::core::sheets::{SheetsError, TabularStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A table name with its columns, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<String>,
}

pub struct IngestService<S, M, P, F>
where
    S: TabularStore,
    M: FileMirror,
    P: AiProvider,
    F: AttachmentSource,
{
    store: S,
    mirror: M,
    inference: InferenceService<P>,
    attachments: F,
    extractor: ContentExtractor,
    naming: FolderNaming,
    worksheet: String,
    // Table name -> lock held while one message's rows are appended.
    table_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S, M, P, F> IngestService<S, M, P, F>
where
    S: TabularStore,
    M: FileMirror,
    P: AiProvider,
    F: AttachmentSource,
{
    pub fn new(
        store: S,
        mirror: M,
        inference: InferenceService<P>,
        attachments: F,
        extractor: ContentExtractor,
        naming: FolderNaming,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            store,
            mirror,
            inference,
            attachments,
            extractor,
            naming,
            worksheet: worksheet.into(),
            table_locks: DashMap::new(),
        }
    }

    pub fn worksheet(&self) -> &str {
        &self.worksheet
    }

    pub async fn handle(&self, message: &IncomingMessage) -> IngestReport {
        self.handle_at(message, Utc::now()).await
    }

    /// Same as [`handle`](Self::handle) with an explicit clock for folder names.
    pub async fn handle_at(&self, message: &IncomingMessage, now: DateTime<Utc>) -> IngestReport {
        let kind = message.kind();
        let mut report = IngestReport::new(kind);

        let file_content = match (&message.attachment, kind) {
            (Some(attachment), MessageKind::Document) => {
                self.extract_attachment(attachment, &mut report).await
            }
            _ => None,
        };

        let text = message.text_content();
        if text.is_some() || file_content.is_some() {
            self.structure(
                text.unwrap_or_default(),
                file_content.as_deref().unwrap_or_default(),
                &mut report,
            )
            .await;
        } else {
            tracing::debug!(%kind, "Nothing to structure, skipping inference");
        }

        if let Some(attachment) = &message.attachment {
            self.mirror_attachment(attachment, now, &mut report).await;
        }

        tracing::info!(
            user_id = message.sender.user_id,
            kind = %report.kind,
            records = report.records.len(),
            rows_appended = report.rows_appended,
            failures = report.has_failures(),
            "Message ingested"
        );
        report
    }

    async fn extract_attachment(
        &self,
        attachment: &Attachment,
        report: &mut IngestReport,
    ) -> Option<String> {
        let fail = |reason: String| IngestNotice::ExtractionFailed {
            filename: attachment.filename.clone(),
            reason,
        };

        // Reject before downloading anything we would refuse anyway.
        let precheck = self
            .extractor
            .check_size(attachment.size)
            .and_then(|_| self.extractor.handler_for(&attachment.filename));
        if let Err(e) = precheck {
            tracing::warn!(filename = %attachment.filename, error = %e, "Attachment rejected");
            report.push(fail(e.to_string()));
            return None;
        }

        let bytes = match self.attachments.fetch(attachment).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(filename = %attachment.filename, error = %e, "Attachment download failed");
                report.push(fail(e.to_string()));
                return None;
            }
        };

        match self.extractor.extract(&bytes, &attachment.filename) {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => {
                report.push(IngestNotice::extracted(&attachment.filename, &text));
                Some(text)
            }
            Err(e) => {
                tracing::warn!(filename = %attachment.filename, error = %e, "Extraction failed");
                report.push(fail(e.to_string()));
                None
            }
        }
    }

    async fn structure(&self, text: &str, file_content: &str, report: &mut IngestReport) {
        let header = match self.store.get_header(&self.worksheet).await {
            Ok(header) => header,
            Err(e) => {
                tracing::error!(table = %self.worksheet, error = %e, "Header read failed");
                report.push(IngestNotice::HeaderUnavailable {
                    table: self.worksheet.clone(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        let answer = match self.inference.structure(text, file_content, &header).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "Inference failed");
                report.push(IngestNotice::InferenceFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let records = match parse(&answer) {
            Ok(parsed) => parsed.into_records(),
            Err(failure) => {
                tracing::warn!(reason = %failure.reason, "Model answer is not structured data");
                report.push(IngestNotice::ParseFailed(failure));
                return;
            }
        };

        report.push(IngestNotice::Records(records.clone()));
        if !records.is_empty() {
            self.append_records(&header, &records, report).await;
        }
        report.records = records;
    }

    async fn append_records(&self, header: &[String], records: &[Record], report: &mut IngestReport) {
        let lock = self.table_lock(&self.worksheet);
        let _guard = lock.lock().await;

        for (appended, record) in records.iter().enumerate() {
            if let Err(e) = self.store.append_row(&self.worksheet, header, record).await {
                tracing::error!(table = %self.worksheet, appended, error = %e, "Append failed");
                report.rows_appended = appended;
                report.push(IngestNotice::AppendFailed {
                    table: self.worksheet.clone(),
                    appended,
                    reason: e.to_string(),
                });
                return;
            }
        }

        report.rows_appended = records.len();
        report.push(IngestNotice::RowsAppended {
            table: self.worksheet.clone(),
            count: records.len(),
        });
    }

    async fn mirror_attachment(
        &self,
        attachment: &Attachment,
        now: DateTime<Utc>,
        report: &mut IngestReport,
    ) {
        let fail = |reason: String| IngestNotice::MirrorFailed {
            filename: attachment.filename.clone(),
            reason,
        };

        let wanted = self.naming.folder_for(&report.records, now);
        let folder = match self.mirror.create_folder(&wanted).await {
            Ok(folder) => folder,
            Err(e) => {
                tracing::error!(folder = %wanted, error = %e, "Folder creation failed");
                report.push(fail(e.to_string()));
                return;
            }
        };

        let destination = format!("/{}/{}", folder, attachment.filename);
        match self.mirror.upload_from_url(&destination, &attachment.url).await {
            Ok(_) => {
                tracing::info!(%destination, "Upload accepted");
                report.push(IngestNotice::Mirrored {
                    filename: attachment.filename.clone(),
                    folder,
                });
            }
            Err(e) => {
                tracing::error!(%destination, error = %e, "Upload rejected");
                report.push(fail(e.to_string()));
            }
        }
    }

    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        self.table_locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Every table with its header row.
    pub async fn describe_tables(&self) -> Result<Vec<TableDescription>, SheetsError> {
        let mut tables = Vec::new();
        for name in self.store.list_tables().await? {
            let columns = self.store.get_header(&name).await?;
            tables.push(TableDescription { name, columns });
        }
        Ok(tables)
    }

    /// Copies `source` over `destination` and returns the number of data rows
    /// written. The destination is cleared first.
    pub async fn snapshot_table(&self, source: &str, destination: &str) -> Result<usize, SheetsError> {
        let snapshot = self.store.export_table(source).await?;
        let rows = snapshot.rows.len();

        let lock = self.table_lock(destination);
        let _guard = lock.lock().await;
        self.store
            .bulk_import(destination, &snapshot.header, &snapshot.rows)
            .await?;

        tracing::info!(%source, %destination, rows, "Table snapshot written");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::{AiConfig, AiMessage, InferenceError, PromptTemplate};
    use crate::core::history::Sender;
    use crate::core::ingest::AttachmentError;
    use crate::core::mirror::{MirrorError, UploadAccepted};
    use crate::core::sheets::{row_from_record, TableSnapshot};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    const TABLE: &str = "Products";

    #[derive(Default)]
    struct FakeStore {
        headers: HashMap<String, Vec<String>>,
        rows: StdMutex<HashMap<String, Vec<Vec<String>>>>,
        fail_after: Option<usize>,
    }

    impl FakeStore {
        fn with_table(name: &str, header: &[&str]) -> Self {
            let mut headers = HashMap::new();
            headers.insert(name.to_string(), header.iter().map(|c| c.to_string()).collect());
            Self {
                headers,
                ..Default::default()
            }
        }

        fn rows(&self, table: &str) -> Vec<Vec<String>> {
            self.rows.lock().unwrap().get(table).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl TabularStore for FakeStore {
        async fn list_tables(&self) -> Result<Vec<String>, SheetsError> {
            let mut names: Vec<String> = self.headers.keys().cloned().collect();
            names.sort();
            Ok(names)
        }

        async fn get_header(&self, table: &str) -> Result<Vec<String>, SheetsError> {
            self.headers
                .get(table)
                .cloned()
                .ok_or_else(|| SheetsError::TableNotFound(table.to_string()))
        }

        async fn append_row(
            &self,
            table: &str,
            header: &[String],
            record: &Record,
        ) -> Result<(), SheetsError> {
            let mut rows = self.rows.lock().unwrap();
            let table_rows = rows.entry(table.to_string()).or_default();
            if Some(table_rows.len()) == self.fail_after {
                return Err(SheetsError::TransientWrite {
                    table: table.to_string(),
                    status: 503,
                    body: "backend unavailable".to_string(),
                });
            }
            table_rows.push(row_from_record(header, record));
            Ok(())
        }

        async fn bulk_import(
            &self,
            table: &str,
            header: &[String],
            rows: &[Vec<String>],
        ) -> Result<(), SheetsError> {
            let mut all = vec![header.to_vec()];
            all.extend(rows.iter().cloned());
            self.rows.lock().unwrap().insert(table.to_string(), all);
            Ok(())
        }

        async fn export_table(&self, table: &str) -> Result<TableSnapshot, SheetsError> {
            let header = self.get_header(table).await?;
            let mut rows = vec![header];
            rows.extend(self.rows(table));
            Ok(TableSnapshot::from_rows(rows))
        }
    }

    #[derive(Default)]
    struct FakeMirror {
        folders: StdMutex<Vec<String>>,
        uploads: StdMutex<Vec<(String, String)>>,
        reject_uploads: bool,
    }

    #[async_trait]
    impl FileMirror for FakeMirror {
        async fn create_folder(&self, name: &str) -> Result<String, MirrorError> {
            let name = crate::core::mirror::sanitize_folder_name(name);
            self.folders.lock().unwrap().push(name.clone());
            Ok(name)
        }

        async fn upload_from_url(
            &self,
            destination: &str,
            source_url: &str,
        ) -> Result<UploadAccepted, MirrorError> {
            if self.reject_uploads {
                return Err(MirrorError::UploadRejected {
                    status: 507,
                    body: "insufficient storage".to_string(),
                });
            }
            self.uploads
                .lock()
                .unwrap()
                .push((destination.to_string(), source_url.to_string()));
            Ok(UploadAccepted {
                destination: destination.to_string(),
            })
        }
    }

    struct FakeModel {
        answer: Option<String>,
        prompts: StdMutex<Vec<String>>,
    }

    impl FakeModel {
        fn answering(answer: &str) -> Self {
            Self {
                answer: Some(answer.to_string()),
                prompts: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AiProvider for FakeModel {
        async fn chat_complete(
            &self,
            messages: &[AiMessage],
            _config: &AiConfig,
        ) -> Result<String, InferenceError> {
            self.prompts
                .lock()
                .unwrap()
                .extend(messages.iter().map(|m| m.content.clone()));
            self.answer
                .clone()
                .ok_or_else(|| InferenceError::Transport("connection reset".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeCdn {
        files: HashMap<String, Vec<u8>>,
        fetched: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl AttachmentSource for FakeCdn {
        async fn fetch(&self, attachment: &Attachment) -> Result<Vec<u8>, AttachmentError> {
            self.fetched.lock().unwrap().push(attachment.url.clone());
            self.files
                .get(&attachment.url)
                .cloned()
                .ok_or_else(|| AttachmentError::Status {
                    filename: attachment.filename.clone(),
                    status: 404,
                })
        }
    }

    type TestService = IngestService<FakeStore, FakeMirror, FakeModel, FakeCdn>;

    fn service(store: FakeStore, mirror: FakeMirror, model: FakeModel, cdn: FakeCdn) -> TestService {
        IngestService::new(
            store,
            mirror,
            InferenceService::new(
                model,
                PromptTemplate::new("text={text_content} file={file_content} columns={column_names}"),
                AiConfig::structured_output("test-model"),
            ),
            cdn,
            ContentExtractor::default(),
            FolderNaming::new(
                vec!["Регион".to_string(), "Кадастровый номер".to_string()],
                chrono_tz::Europe::Moscow,
            ),
            TABLE,
        )
    }

    fn products() -> FakeStore {
        FakeStore::with_table(TABLE, &["brand", "model", "sex", "color", "size", "price"])
    }

    fn sender() -> Sender {
        Sender {
            user_id: 42,
            username: "seller".to_string(),
            display_name: Some("Seller".to_string()),
        }
    }

    fn text_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            sender: sender(),
            text: Some(text.to_string()),
            attachment: None,
        }
    }

    fn attached(filename: &str, content_type: &str, size: u64, caption: Option<&str>) -> IncomingMessage {
        IncomingMessage {
            sender: sender(),
            text: caption.map(str::to_string),
            attachment: Some(Attachment {
                url: format!("https://cdn.example/{filename}"),
                filename: filename.to_string(),
                content_type: Some(content_type.to_string()),
                size,
            }),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 9, 15, 0).unwrap()
    }

    #[tokio::test]
    async fn text_message_appends_one_row() {
        let model = FakeModel::answering(
            "```{\"brand\": \"Saucony\", \"model\": \"Kinvara 14\", \"sex\": \"man\", \"color\": \"yellow/black\", \"size\": 41, \"price\": 120}```",
        );
        let service = service(products(), FakeMirror::default(), model, FakeCdn::default());

        let report = service
            .handle_at(&text_message("Saucony Kinvara 14 man 41 yellow/black 120"), noon())
            .await;

        assert_eq!(report.kind, MessageKind::Text);
        assert_eq!(report.rows_appended, 1);
        assert!(!report.has_failures());
        assert_eq!(
            service.store.rows(TABLE),
            vec![vec!["Saucony", "Kinvara 14", "man", "yellow/black", "41", "120"]]
        );
        assert_eq!(
            service.inference_prompts(),
            vec!["text=Saucony Kinvara 14 man 41 yellow/black 120 file= columns=brand,model,sex,color,size,price"]
        );
        assert!(service.mirror.folders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_answer_appends_rows_in_order() {
        let model = FakeModel::answering("[{\"brand\": \"A\"}, {\"brand\": \"B\"}, {\"brand\": \"C\"}]");
        let service = service(products(), FakeMirror::default(), model, FakeCdn::default());

        let report = service.handle_at(&text_message("three pairs"), noon()).await;

        assert_eq!(report.rows_appended, 3);
        let brands: Vec<String> = service.store.rows(TABLE).into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(brands, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn first_append_error_stops_the_rest() {
        let store = FakeStore {
            fail_after: Some(1),
            ..products()
        };
        let model = FakeModel::answering("[{\"brand\": \"A\"}, {\"brand\": \"B\"}, {\"brand\": \"C\"}]");
        let service = service(store, FakeMirror::default(), model, FakeCdn::default());

        let report = service.handle_at(&text_message("three pairs"), noon()).await;

        assert_eq!(report.rows_appended, 1);
        assert_eq!(service.store.rows(TABLE).len(), 1);
        assert!(report
            .notices
            .iter()
            .any(|n| matches!(n, IngestNotice::AppendFailed { appended: 1, .. })));
    }

    #[tokio::test]
    async fn unparseable_answer_skips_append_only() {
        let model = FakeModel::answering("Sorry, I cannot help with that.");
        let mut cdn = FakeCdn::default();
        cdn.files
            .insert("https://cdn.example/photo.jpg".to_string(), vec![0xFF, 0xD8]);
        let service = service(products(), FakeMirror::default(), model, cdn);

        let report = service
            .handle_at(&attached("photo.jpg", "image/jpeg", 2, Some("some shoes")), noon())
            .await;

        assert_eq!(report.kind, MessageKind::Photo);
        assert!(service.store.rows(TABLE).is_empty());
        assert!(matches!(report.notices[0], IngestNotice::ParseFailed(_)));
        // Photos are never downloaded, only mirrored by URL.
        assert!(service.attachments.fetched.lock().unwrap().is_empty());
        assert_eq!(
            *service.mirror.uploads.lock().unwrap(),
            vec![(
                "/2024-03-08-12-15/photo.jpg".to_string(),
                "https://cdn.example/photo.jpg".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn photo_without_caption_is_only_mirrored() {
        let model = FakeModel::answering("{}");
        let service = service(products(), FakeMirror::default(), model, FakeCdn::default());

        let report = service
            .handle_at(&attached("IMG_001.png", "image/png", 2048, None), noon())
            .await;

        assert!(service.inference_prompts().is_empty());
        assert_eq!(report.notices.len(), 1);
        assert!(matches!(report.notices[0], IngestNotice::Mirrored { .. }));
    }

    #[tokio::test]
    async fn oversized_document_is_not_downloaded() {
        let model = FakeModel::answering("{\"brand\": \"Saucony\"}");
        let service = service(products(), FakeMirror::default(), model, FakeCdn::default());

        let report = service
            .handle_at(
                &attached("catalog.pdf", "application/pdf", 12 * 1024 * 1024, Some("catalog")),
                noon(),
            )
            .await;

        assert!(service.attachments.fetched.lock().unwrap().is_empty());
        assert!(matches!(
            report.notices[0],
            IngestNotice::ExtractionFailed { .. }
        ));
        // The caption alone still goes to the model.
        assert_eq!(report.rows_appended, 1);
        assert_eq!(
            service.inference_prompts(),
            vec!["text=catalog file= columns=brand,model,sex,color,size,price"]
        );
    }

    #[tokio::test]
    async fn document_text_reaches_the_prompt_and_names_the_folder() {
        let store = FakeStore::with_table(TABLE, &["Регион", "Кадастровый номер", "Площадь"]);
        let model = FakeModel::answering(
            "```json\n{\"Регион\": \"Москва,\", \"Кадастровый номер\": \"уч. №5\", \"Площадь\": 600}\n```",
        );
        let mut cdn = FakeCdn::default();
        cdn.files.insert(
            "https://cdn.example/deed.txt".to_string(),
            "Участок 600 м2".as_bytes().to_vec(),
        );
        let service = service(store, FakeMirror::default(), model, cdn);

        let report = service
            .handle_at(&attached("deed.txt", "text/plain", 22, None), noon())
            .await;

        assert!(matches!(
            &report.notices[0],
            IngestNotice::ExtractedContent { preview, .. } if preview == "Участок 600 м2"
        ));
        assert_eq!(
            service.inference_prompts(),
            vec!["text= file=Участок 600 м2 columns=Регион,Кадастровый номер,Площадь"]
        );
        assert_eq!(
            *service.mirror.folders.lock().unwrap(),
            vec!["Москва-уч-5".to_string()]
        );
        assert_eq!(
            service.mirror.uploads.lock().unwrap()[0].0,
            "/Москва-уч-5/deed.txt"
        );
    }

    #[tokio::test]
    async fn missing_table_stops_before_inference() {
        let service = service(
            FakeStore::default(),
            FakeMirror::default(),
            FakeModel::answering("{}"),
            FakeCdn::default(),
        );

        let report = service.handle_at(&text_message("anything"), noon()).await;

        assert!(service.inference_prompts().is_empty());
        assert!(matches!(
            report.notices[0],
            IngestNotice::HeaderUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn inference_failure_still_mirrors() {
        let model = FakeModel {
            answer: None,
            prompts: StdMutex::new(Vec::new()),
        };
        let mirror = FakeMirror {
            reject_uploads: true,
            ..Default::default()
        };
        let service = service(products(), mirror, model, FakeCdn::default());

        let report = service
            .handle_at(&attached("shoe.webp", "image/webp", 10, Some("Saucony")), noon())
            .await;

        assert!(matches!(
            report.notices[0],
            IngestNotice::InferenceFailed { .. }
        ));
        assert!(matches!(
            report.notices[1],
            IngestNotice::MirrorFailed { .. }
        ));
        assert_eq!(*service.mirror.folders.lock().unwrap(), vec!["2024-03-08-12-15"]);
    }

    #[tokio::test]
    async fn snapshot_copies_rows_into_destination() {
        let model = FakeModel::answering("[{\"brand\": \"A\", \"price\": 1}, {\"brand\": \"B\"}]");
        let service = service(products(), FakeMirror::default(), model, FakeCdn::default());
        service.handle_at(&text_message("two"), noon()).await;

        let copied = service.snapshot_table(TABLE, "Backup").await.unwrap();

        assert_eq!(copied, 2);
        let backup = service.store.rows("Backup");
        assert_eq!(backup[0][0], "brand");
        assert_eq!(backup[1], vec!["A", "", "", "", "", "1"]);
    }

    #[tokio::test]
    async fn snapshot_keeps_cells_under_blank_header_columns() {
        let store = FakeStore::with_table("Ledger", &["brand", "", "", "price"]);
        store.rows.lock().unwrap().insert(
            "Ledger".to_string(),
            vec![vec!["Saucony".into(), "x".into(), "y".into(), "120".into()]],
        );
        let service = service(
            store,
            FakeMirror::default(),
            FakeModel::answering("{}"),
            FakeCdn::default(),
        );

        let copied = service.snapshot_table("Ledger", "Backup").await.unwrap();

        assert_eq!(copied, 1);
        assert_eq!(
            service.store.rows("Backup"),
            vec![vec!["brand", "", "", "price"], vec!["Saucony", "x", "y", "120"]]
        );
    }

    #[tokio::test]
    async fn describe_lists_tables_with_columns() {
        let service = service(
            products(),
            FakeMirror::default(),
            FakeModel::answering("{}"),
            FakeCdn::default(),
        );
        let tables = service.describe_tables().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, TABLE);
        assert_eq!(tables[0].columns[0], "brand");
    }

    impl TestService {
        fn inference_prompts(&self) -> Vec<String> {
            self.inference.provider().prompts.lock().unwrap().clone()
        }
    }
}
