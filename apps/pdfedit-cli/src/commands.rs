//! Subcommand handlers and their output formatting

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use pdfedit_core::{
    decode_flags, fonts, EditableDocument, FontLibrary, PdfDocument, TextSpan,
};
use pdfedit_service::{DocumentRecord, EditService, Reply};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_record(record: &DocumentRecord) -> String {
    format!(
        "{}  {}  uploaded {}\n  original: {}\n  current:  {}",
        record.id,
        record.filename,
        record.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
        record.original_location,
        record.current_location()
    )
}

fn format_span(page: usize, span: &TextSpan) -> String {
    let style = decode_flags(span.flags);
    format!(
        "p{} {:?} font={} size={:.1} color=#{:06x} bold={} italic={} bbox=[{:.1}, {:.1}, {:.1}, {:.1}]",
        page + 1,
        span.text,
        span.font,
        span.size,
        span.color,
        style.bold,
        style.italic,
        span.bbox.x0,
        span.bbox.y0,
        span.bbox.x1,
        span.bbox.y1
    )
}

fn format_reply(reply: &Reply) -> String {
    match reply {
        Reply::Edited(outcome) => format!(
            "{} ({} span{}) -> {}",
            outcome.change,
            outcome.spans_changed,
            if outcome.spans_changed == 1 { "" } else { "s" },
            outcome.location
        ),
        Reply::Answer { text } => text.clone(),
    }
}

pub async fn upload(service: &EditService, file: &Path, as_json: bool) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Upload path has no file name")?;
    let record = service.upload(&filename, bytes).await?;
    if as_json {
        return print_json(&record);
    }
    println!("{}", format_record(&record));
    Ok(())
}

pub async fn list(service: &EditService, as_json: bool) -> Result<()> {
    let records = service.documents().await?;
    if as_json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("No documents uploaded yet");
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

pub async fn show(service: &EditService, id: &str, as_json: bool) -> Result<()> {
    let record = service.document(id).await?;
    let text = service.current_text(id).await?;
    if as_json {
        return print_json(&json!({ "document": record, "text": text }));
    }
    println!("{}\n\n{}", format_record(&record), text);
    Ok(())
}

pub async fn edit(
    service: &EditService,
    id: &str,
    original: &str,
    replacement: &str,
    as_json: bool,
) -> Result<()> {
    let outcome = service.edit(id, original, replacement).await?;
    if as_json {
        return print_json(&outcome);
    }
    println!("{}", format_reply(&Reply::Edited(outcome)));
    Ok(())
}

pub async fn chat_once(
    service: &EditService,
    id: &str,
    instruction: &str,
    as_json: bool,
) -> Result<()> {
    let reply = service.handle_instruction(id, instruction).await?;
    if as_json {
        return print_json(&reply);
    }
    println!("{}", format_reply(&reply));
    Ok(())
}

/// Read instructions from stdin until EOF or "exit"
pub async fn chat_session(service: &EditService, id: &str) -> Result<()> {
    let record = service.document(id).await?;
    println!("Chatting with {} (empty line or \"exit\" to quit)", record.filename);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let instruction = line.trim();
        if instruction.is_empty() || instruction.eq_ignore_ascii_case("exit") {
            break;
        }
        match service.handle_instruction(id, instruction).await {
            Ok(reply) => println!("{}", format_reply(&reply)),
            // Keep the session alive; the user can rephrase
            Err(e) => {
                warn!("Instruction failed: {}", e);
                println!("Sorry, that did not work: {}", e);
            }
        }
    }
    service.forget_conversation(id).await;
    Ok(())
}

pub async fn spans(
    service: &EditService,
    source: &str,
    page: Option<usize>,
    contains: Option<&str>,
    as_json: bool,
) -> Result<()> {
    let bytes = if Path::new(source).is_file() {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read {}", source))?
    } else {
        service.current_bytes(source).await?
    };

    let doc = PdfDocument::load(&bytes)?;
    let pages: Vec<usize> = match page {
        Some(0) => bail!("Pages are numbered from 1"),
        Some(n) if n > doc.page_count() => {
            bail!("Page {} out of range (document has {})", n, doc.page_count())
        }
        Some(n) => vec![n - 1],
        None => (0..doc.page_count()).collect(),
    };

    let mut matched = Vec::new();
    for index in pages {
        let text_page = doc.text_page(index)?;
        for span in text_page.spans() {
            if contains.map_or(true, |needle| span.text.contains(needle)) {
                matched.push((index, span.clone()));
            }
        }
    }

    if as_json {
        let rows: Vec<_> = matched
            .iter()
            .map(|(index, span)| json!({ "page": index + 1, "span": span }))
            .collect();
        return print_json(&rows);
    }
    for (index, span) in &matched {
        println!("{}", format_span(*index, span));
    }
    Ok(())
}

pub fn fonts(library: &FontLibrary, names: &[String], as_json: bool) -> Result<()> {
    let rows: Vec<_> = names
        .iter()
        .map(|name| {
            let local = library.find(name).map(|font| {
                font.path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .or_else(|| font.postscript_name.clone())
                    .unwrap_or_default()
            });
            (name.as_str(), fonts::resolve(name), local)
        })
        .collect();

    if as_json {
        let rows: Vec<_> = rows
            .iter()
            .map(|(name, substitute, local)| {
                json!({ "font": name, "substitute": substitute, "library": local })
            })
            .collect();
        return print_json(&rows);
    }
    for (name, substitute, local) in &rows {
        println!(
            "{} -> {} (library: {})",
            name,
            substitute,
            local.as_deref().unwrap_or("none")
        );
    }
    Ok(())
}
