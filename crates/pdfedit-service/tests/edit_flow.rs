//! Upload → instruction → edit flows against in-memory collaborators
//!
//! Run with: cargo test -p pdfedit-service --test edit_flow

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream, StringFormat,
};
use pdfedit_assist::{DelegateError, TextDelegate};
use pdfedit_core::{EditError, FontLibrary};
use pdfedit_service::{
    ArtifactStore, DocumentStore, EditService, MemoryDocumentStore, ObjectArtifactStore, Reply,
    ServiceError,
};
use regex::Regex;
use tokio::sync::Notify;

/// Canned delegate responses, with every prompt recorded
#[derive(Default)]
struct RecordingDelegate {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::default(),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextDelegate for RecordingDelegate {
    async fn complete(&self, prompt: &str) -> Result<String, DelegateError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(DelegateError::EmptyResponse)
    }
}

/// Answers once released, after signalling that a prompt arrived
struct GatedDelegate {
    response: String,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl TextDelegate for GatedDelegate {
    async fn complete(&self, _prompt: &str) -> Result<String, DelegateError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.response.clone())
    }
}

fn xbzar_bold(doc: &mut Document) -> Object {
    let file = doc.add_object(Stream::new(dictionary! {}, vec![0u8; 16]));
    let descriptor = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "XBZar-Bold",
        "Flags" => 262_176,
        "Ascent" => 900,
        "Descent" => -250,
        "ItalicAngle" => 0,
        "FontFile2" => file,
    });
    let widths: Vec<Object> = (32..=90u8)
        .map(|code| match code {
            b' ' | b'.' => Object::Integer(250),
            b'1' => Object::Integer(500),
            b'N' | b'O' => Object::Integer(722),
            _ => Object::Integer(0),
        })
        .collect();
    Object::Reference(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => "XBZar-Bold",
        "FirstChar" => 32,
        "LastChar" => 90,
        "Widths" => widths,
        "Encoding" => "WinAnsiEncoding",
        "FontDescriptor" => descriptor,
    }))
}

fn helvetica(doc: &mut Document) -> Object {
    Object::Reference(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    }))
}

/// Single page showing `lines` top to bottom in font F1 at 12pt
fn build_pdf(lines: &[&str], font: fn(&mut Document) -> Object) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_ref = font(&mut doc);

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
        Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
    ];
    for line in lines {
        operations.push(Operation::new(
            "Tj",
            vec![Object::String(line.as_bytes().to_vec(), StringFormat::Literal)],
        ));
        operations.push(Operation::new("Td", vec![Object::Integer(0), Object::Integer(-20)]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_ref } },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

struct Harness {
    service: EditService,
    artifacts: Arc<ObjectArtifactStore>,
    documents: Arc<MemoryDocumentStore>,
    delegate: Arc<RecordingDelegate>,
}

fn harness(responses: &[&str]) -> Harness {
    let artifacts = Arc::new(ObjectArtifactStore::in_memory());
    let documents = Arc::new(MemoryDocumentStore::new());
    let delegate = Arc::new(RecordingDelegate::new(responses));
    let service = EditService::new(
        artifacts.clone(),
        documents.clone(),
        delegate.clone(),
        Arc::new(FontLibrary::empty()),
    );
    Harness {
        service,
        artifacts,
        documents,
        delegate,
    }
}

#[tokio::test]
async fn test_upload_registers_original() {
    let h = harness(&[]);
    let bytes = build_pdf(&["Hello"], helvetica);
    let record = h.service.upload("report.PDF", bytes.clone()).await.unwrap();

    assert_eq!(record.filename, "report.PDF");
    assert_eq!(
        record.original_location,
        format!("uploads/{}_report.PDF", record.id)
    );
    assert_eq!(record.edited_location, None);
    assert_eq!(h.artifacts.get(&record.original_location).await.unwrap(), bytes);
    assert_eq!(h.service.documents().await.unwrap(), vec![record.clone()]);
    assert_eq!(h.service.document(&record.id).await.unwrap(), record);
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let h = harness(&[]);
    assert!(matches!(
        h.service.upload("notes.txt", b"hello".to_vec()).await,
        Err(ServiceError::InvalidUpload(_))
    ));
    assert!(matches!(
        h.service.upload("fake.pdf", b"hello".to_vec()).await,
        Err(ServiceError::Edit(EditError::ParseError(_)))
    ));
    assert!(h.service.documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_edit_instruction_with_substitute_font() {
    let h = harness(&["Original: NO. 1\nNew: TEST"]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["NO. 1"], xbzar_bold))
        .await
        .unwrap();

    let reply = h
        .service
        .handle_instruction(&record.id, "Change NO. 1 to TEST")
        .await
        .unwrap();

    let Reply::Edited(outcome) = reply else {
        panic!("expected an edit, got {:?}", reply);
    };
    assert!(outcome.success);
    assert!(outcome.spans_changed >= 1);
    assert_eq!(outcome.change, "Changed 'NO. 1' to 'TEST'");
    let pattern = Regex::new(r"^edited_\d+_invoice\.pdf$").unwrap();
    assert!(pattern.is_match(&outcome.location), "{}", outcome.location);

    // Pattern match decided the intent; the only delegate call was extraction
    let prompts = h.delegate.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Original: <text currently in the document>"));

    let stored = h.documents.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.edited_location.as_deref(), Some(outcome.location.as_str()));
    assert!(h.service.current_text(&record.id).await.unwrap().contains("TEST"));
}

#[tokio::test]
async fn test_question_never_mutates() {
    let h = harness(&["QUESTION", "The total is $40."]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Total: $40"], helvetica))
        .await
        .unwrap();

    let reply = h
        .service
        .handle_instruction(&record.id, "What is the total amount?")
        .await
        .unwrap();

    assert_eq!(
        reply,
        Reply::Answer {
            text: "The total is $40.".to_string()
        }
    );
    let prompts = h.delegate.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts.iter().all(|p| !p.contains("Original:")));
    assert!(prompts[1].contains("Total: $40"));
    assert_eq!(
        h.documents.get(&record.id).await.unwrap().unwrap().edited_location,
        None
    );
}

#[tokio::test]
async fn test_second_edit_reads_latest_version() {
    let h = harness(&[]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Invoice 1001"], helvetica))
        .await
        .unwrap();

    let first = h.service.edit(&record.id, "1001", "2002").await.unwrap();
    // "2002" only exists in the edited version
    let second = h.service.edit(&record.id, "2002", "3003").await.unwrap();

    assert_ne!(first.location, second.location);
    assert!(second.location.ends_with("_invoice.pdf"));
    let current = h.service.document(&record.id).await.unwrap();
    assert_eq!(current.current_location(), second.location);
    assert!(h.service.current_text(&record.id).await.unwrap().contains("3003"));
}

#[tokio::test]
async fn test_edits_of_different_lines_accumulate() {
    let h = harness(&[]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Invoice 1001", "Total 40"], helvetica))
        .await
        .unwrap();

    h.service.edit(&record.id, "1001", "2002").await.unwrap();
    // "Total" is untouched original text on the already-edited page
    h.service.edit(&record.id, "Total", "Sum").await.unwrap();

    let text = h.service.current_text(&record.id).await.unwrap();
    assert!(text.contains("Invoice 2002"), "{}", text);
    assert!(text.contains("Sum 40"), "{}", text);
    assert!(!text.contains("1001"), "{}", text);
    assert!(!text.contains("Total"), "{}", text);
}

#[tokio::test]
async fn test_missing_target_writes_nothing() {
    let h = harness(&[]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Invoice 1001"], helvetica))
        .await
        .unwrap();

    let err = h.service.edit(&record.id, "absent", "x").await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Edit(EditError::NoMatchFound { ref target }) if target == "absent"
    ));
    let stored = h.documents.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.edited_location, None);
    assert_eq!(stored.current_location(), record.original_location);
}

#[tokio::test]
async fn test_failed_extraction_is_reported() {
    let h = harness(&["I think you mean the invoice number."]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Invoice 1001"], helvetica))
        .await
        .unwrap();

    let err = h
        .service
        .handle_instruction(&record.id, "replace the number with 2002")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Assist(pdfedit_assist::AssistError::ExtractionFailed(_))
    ));
}

#[tokio::test]
async fn test_unknown_document() {
    let h = harness(&[]);
    assert!(matches!(
        h.service.edit("nope", "a", "b").await,
        Err(ServiceError::DocumentNotFound(_))
    ));
    assert!(matches!(
        h.service.handle_instruction("nope", "Change a to b").await,
        Err(ServiceError::DocumentNotFound(_))
    ));
}

#[tokio::test]
async fn test_concurrent_edits_of_one_document_both_land() {
    let h = harness(&[]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Invoice 1001"], helvetica))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        h.service.edit(&record.id, "Invoice", "Bill"),
        h.service.edit(&record.id, "1001", "2002"),
    );
    a.unwrap();
    b.unwrap();

    let text = h.service.current_text(&record.id).await.unwrap();
    assert!(text.contains("Bill"), "{}", text);
    assert!(text.contains("2002"), "{}", text);
}

#[tokio::test]
async fn test_edits_wait_while_an_instruction_is_extracted() {
    let delegate = Arc::new(GatedDelegate {
        response: "Original: 1001\nNew: 2002".to_string(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let service = Arc::new(EditService::new(
        Arc::new(ObjectArtifactStore::in_memory()),
        Arc::new(MemoryDocumentStore::new()),
        delegate.clone(),
        Arc::new(FontLibrary::empty()),
    ));
    let record = service
        .upload("invoice.pdf", build_pdf(&["Invoice 1001"], helvetica))
        .await
        .unwrap();

    let instruction = tokio::spawn({
        let service = service.clone();
        let id = record.id.clone();
        async move { service.handle_instruction(&id, "Change 1001 to 2002").await }
    });
    delegate.entered.notified().await;

    let direct = tokio::spawn({
        let service = service.clone();
        let id = record.id.clone();
        async move { service.edit(&id, "Invoice", "Bill").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!direct.is_finished());

    delegate.release.notify_one();
    assert!(matches!(
        instruction.await.unwrap().unwrap(),
        Reply::Edited(_)
    ));
    direct.await.unwrap().unwrap();

    let text = service.current_text(&record.id).await.unwrap();
    assert!(text.contains("Bill 2002"), "{}", text);
}

#[tokio::test]
async fn test_forgotten_conversation_starts_fresh() {
    let h = harness(&["The total is $40.", "ACME Corp."]);
    let record = h
        .service
        .upload("invoice.pdf", build_pdf(&["Total: $40"], helvetica))
        .await
        .unwrap();

    h.service.ask(&record.id, "What is the total?").await.unwrap();
    h.service.forget_conversation(&record.id).await;
    h.service.ask(&record.id, "Who is billed?").await.unwrap();

    let prompts = h.delegate.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[1].contains("What is the total?"));
    assert!(prompts[1].contains("Who is billed?"));
}
