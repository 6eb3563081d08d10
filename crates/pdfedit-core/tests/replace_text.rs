//! End-to-end replacement over generated PDFs
//!
//! Run with: cargo test -p pdfedit-core --test replace_text

use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, Stream, StringFormat,
};
use pdfedit_core::{
    extract_text, replace_text, EditError, EditableDocument, FontLibrary, FontTier,
    MutationEngine, PdfDocument,
};

/// Font with glyphs only for the characters of "NO. 1", embedded
fn partial_embedded_font(doc: &mut Document) -> Object {
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

/// One page per entry; each page shows its lines with font F1 at 12pt
fn build_pdf(pages: &[&[&str]], font: fn(&mut Document) -> Object) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_ref = font(&mut doc);

    let mut kids = Vec::new();
    for lines in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
        ];
        for line in lines.iter() {
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(
                    line.as_bytes().to_vec(),
                    StringFormat::Literal,
                )],
            ));
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(0), Object::Integer(-20)],
            ));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_ref.clone() } },
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save fixture");
    bytes
}

#[test]
fn test_missing_glyphs_fall_back_to_bold_substitute() {
    let input = build_pdf(&[&["NO. 1"]], partial_embedded_font);
    let library = FontLibrary::empty();

    let (output, report) = replace_text(&input, "NO. 1", "TEST", &library).unwrap();

    assert_eq!(report.spans_changed(), 1);
    let change = &report.changes[0];
    assert_eq!(change.tier, FontTier::Substitute);
    assert_eq!(change.font_used, "Helvetica-Bold");
    assert_eq!(change.original_font, "XBZar-Bold");
    assert_eq!(change.new_text, "TEST");
    assert_eq!(report.substitutions(), 1);

    let text = extract_text(&output).unwrap();
    assert!(text.contains("TEST"), "re-extracted text: {text:?}");
}

#[test]
fn test_every_matching_span_is_replaced() {
    let input = build_pdf(
        &[&["Invoice 1001", "Total"], &["Invoice 1001 (copy)"]],
        helvetica,
    );
    let library = FontLibrary::empty();

    let (output, report) = replace_text(&input, "1001", "2002", &library).unwrap();

    assert_eq!(report.spans_changed(), 2);
    assert!(report.failures.is_empty());
    let pages: Vec<usize> = report.changes.iter().map(|c| c.page).collect();
    assert_eq!(pages, vec![0, 1]);
    for change in &report.changes {
        assert_eq!(change.tier, FontTier::OriginalByName);
        assert_eq!(change.font_used, "Helvetica");
    }
    assert_eq!(report.changes[1].new_text, "Invoice 2002 (copy)");

    let text = extract_text(&output).unwrap();
    assert!(text.contains("Invoice 2002"));
    assert_eq!(pdfedit_core::get_page_count(&output).unwrap(), 2);
}

#[test]
fn test_no_match_stages_nothing() {
    let input = build_pdf(&[&["Hello world"]], helvetica);
    let library = FontLibrary::empty();

    let mut doc = PdfDocument::load(&input).unwrap();
    let err = MutationEngine::new(&library)
        .mutate(&mut doc, "absent", "x")
        .unwrap_err();

    assert_eq!(
        err,
        EditError::NoMatchFound {
            target: "absent".to_string()
        }
    );
    assert_eq!(err.to_string(), "Text 'absent' not found in document");
    assert_eq!(doc.pending_operations(), 0);
    assert!(replace_text(&input, "absent", "x", &library).is_err());
}

#[test]
fn test_match_is_case_sensitive() {
    let input = build_pdf(&[&["Hello world"]], helvetica);
    let library = FontLibrary::empty();

    assert!(matches!(
        replace_text(&input, "hello", "Bye", &library),
        Err(EditError::NoMatchFound { .. })
    ));
}

#[test]
fn test_span_geometry_survives_save() {
    let input = build_pdf(&[&["Amount due"]], helvetica);
    let mut doc = PdfDocument::load(&input).unwrap();
    let before = doc.text_page(0).unwrap();
    let span = before.spans().next().unwrap().clone();

    let library = FontLibrary::empty();
    MutationEngine::new(&library)
        .mutate(&mut doc, "due", "paid")
        .unwrap();
    let output = doc.save().unwrap();

    let after = PdfDocument::load(&output).unwrap().text_page(0).unwrap();
    let redrawn = after
        .spans()
        .find(|s| s.text == "Amount paid")
        .expect("redrawn span");
    assert!((redrawn.bbox.x0 - span.bbox.x0).abs() < 0.5);
    assert!((redrawn.bbox.y1 - span.bbox.y1).abs() < 0.5);
    assert_eq!(redrawn.size, span.size);
}

#[test]
fn test_chained_edits_on_one_page() {
    let input = build_pdf(&[&["Invoice 1001", "Total 40"]], helvetica);
    let library = FontLibrary::empty();

    let (first, _) = replace_text(&input, "1001", "2002", &library).unwrap();
    let text = extract_text(&first).unwrap();
    assert!(text.contains("Invoice 2002"), "{}", text);
    assert!(text.contains("Total 40"), "{}", text);
    // The cleared text is painted over and no longer matches
    assert!(!text.contains("1001"), "{}", text);
    assert!(matches!(
        replace_text(&first, "1001", "x", &library),
        Err(EditError::NoMatchFound { .. })
    ));

    let (second, report) = replace_text(&first, "Total", "Sum", &library).unwrap();
    assert_eq!(report.spans_changed(), 1);
    let text = extract_text(&second).unwrap();
    assert!(text.contains("Invoice 2002"), "{}", text);
    assert!(text.contains("Sum 40"), "{}", text);
    assert!(!text.contains("Total"), "{}", text);
}
