//! Content stream interpretation into blocks, lines and spans

use std::collections::BTreeMap;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use super::font::PageFont;
use super::objects::{as_dict, get, media_box, name, number};
use crate::error::EditError;
use crate::model::{Block, Rect, TextLine, TextPage, TextSpan};
use crate::style::FLAG_SUPERSCRIPT;

/// TJ adjustment (thousandths of an em) wide enough to read as a space
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Share of a span's box a later fill must cover to hide the span
const HIDDEN_COVERAGE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        let values: Vec<f32> = operands.iter().filter_map(number).collect();
        let values: [f32; 6] = values.try_into().ok()?;
        Some(Matrix(values))
    }

    /// `self` applied first, then `other`
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn vertical_scale(&self) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: u32,
    font: Option<Vec<u8>>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill: 0,
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Text shown by one operator, in top-down page coordinates
#[derive(Debug, Clone)]
struct Run {
    text: String,
    font: String,
    size: f32,
    color: u32,
    flags: u32,
    bbox: Rect,
    baseline: f32,
}

enum ShowItem<'a> {
    Text(&'a [u8]),
    Adjust(f32),
}

fn pack_rgb(r: f32, g: f32, b: f32) -> u32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(r) << 16) | (channel(g) << 8) | channel(b)
}

fn fill_from_operands(operands: &[Object]) -> Option<u32> {
    let values: Vec<f32> = operands.iter().filter_map(number).collect();
    match values.as_slice() {
        [gray] => Some(pack_rgb(*gray, *gray, *gray)),
        [r, g, b] => Some(pack_rgb(*r, *g, *b)),
        [c, m, y, k] => Some(pack_rgb(
            (1.0 - c) * (1.0 - k),
            (1.0 - m) * (1.0 - k),
            (1.0 - y) * (1.0 - k),
        )),
        _ => None,
    }
}

struct Interpreter<'a> {
    fonts: &'a BTreeMap<Vec<u8>, PageFont>,
    xobjects: BTreeMap<Vec<u8>, bool>,
    media: [f32; 4],
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    in_text: bool,
    runs: Vec<Run>,
    blocks: Vec<Block>,
    /// Rectangles of the path under construction
    path: Vec<Rect>,
}

impl<'a> Interpreter<'a> {
    fn to_top_down(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.media[0], self.media[3] - y)
    }

    fn run(&mut self, content: &Content) {
        for op in &content.operations {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                "q" => self.stack.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.stack.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.state.ctm = m.then(&self.state.ctm);
                    }
                }
                "g" | "rg" | "k" | "sc" | "scn" => {
                    if let Some(fill) = fill_from_operands(operands) {
                        self.state.fill = fill;
                    }
                }
                "BT" => {
                    self.in_text = true;
                    self.tm = Matrix::IDENTITY;
                    self.tlm = Matrix::IDENTITY;
                    self.runs.clear();
                }
                "ET" => {
                    self.in_text = false;
                    self.flush_block();
                }
                "Tf" => {
                    if let [font, size, ..] = operands {
                        self.state.font = name(font).map(<[u8]>::to_vec);
                        self.state.size = number(size).unwrap_or(0.0);
                    }
                }
                "Tc" => self.state.char_spacing = first_number(operands),
                "Tw" => self.state.word_spacing = first_number(operands),
                "Tz" => self.state.h_scale = first_number(operands) / 100.0,
                "TL" => self.state.leading = first_number(operands),
                "Ts" => self.state.rise = first_number(operands),
                "Td" => {
                    if let [tx, ty, ..] = operands {
                        self.move_line(number(tx).unwrap_or(0.0), number(ty).unwrap_or(0.0));
                    }
                }
                "TD" => {
                    if let [tx, ty, ..] = operands {
                        let ty = number(ty).unwrap_or(0.0);
                        self.state.leading = -ty;
                        self.move_line(number(tx).unwrap_or(0.0), ty);
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        self.tm = m;
                        self.tlm = m;
                    }
                }
                "T*" => self.next_line(),
                "Tj" => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(&[ShowItem::Text(bytes)]);
                    }
                }
                "'" => {
                    self.next_line();
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(&[ShowItem::Text(bytes)]);
                    }
                }
                "\"" => {
                    if let [aw, ac, Object::String(bytes, _)] = operands {
                        self.state.word_spacing = number(aw).unwrap_or(0.0);
                        self.state.char_spacing = number(ac).unwrap_or(0.0);
                        self.next_line();
                        self.show(&[ShowItem::Text(bytes)]);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = operands.first() {
                        let items: Vec<ShowItem<'_>> = items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(bytes, _) => Some(ShowItem::Text(bytes)),
                                other => number(other).map(ShowItem::Adjust),
                            })
                            .collect();
                        self.show(&items);
                    }
                }
                "re" => {
                    let values: Vec<f32> = operands.iter().filter_map(number).collect();
                    if let [x, y, w, h] = values.as_slice() {
                        let rect = self.device_rect(*x, *y, *w, *h);
                        self.path.push(rect);
                    }
                }
                "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    for rect in std::mem::take(&mut self.path) {
                        self.hide_covered(&rect);
                    }
                }
                "n" | "S" | "s" => self.path.clear(),
                "Do" => {
                    if let Some(xobject) = operands.first().and_then(name) {
                        if self.xobjects.get(xobject).copied().unwrap_or(false) {
                            self.push_image();
                        }
                    }
                }
                _ => {}
            }
        }
        if self.in_text {
            self.flush_block();
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.state.leading;
        self.move_line(0.0, -leading);
    }

    fn show(&mut self, items: &[ShowItem<'_>]) {
        if !self.in_text {
            return;
        }
        let fonts = self.fonts;
        let Some(font) = self.state.font.as_ref().and_then(|key| fonts.get(key)) else {
            return;
        };
        let size = self.state.size;
        let h_scale = self.state.h_scale;
        let rise = self.state.rise;

        let start = self.tm.then(&self.state.ctm);
        let mut text = String::new();
        for item in items {
            match item {
                ShowItem::Text(bytes) => {
                    for glyph in font.decode(bytes) {
                        let mut advance = glyph.width / 1000.0 * size + self.state.char_spacing;
                        if glyph.is_word_space {
                            advance += self.state.word_spacing;
                        }
                        text.push_str(&glyph.text);
                        self.tm = Matrix::translate(advance * h_scale, 0.0).then(&self.tm);
                    }
                }
                ShowItem::Adjust(amount) => {
                    if *amount < -TJ_SPACE_THRESHOLD && !text.is_empty() && !text.ends_with(' ') {
                        text.push(' ');
                    }
                    let shift = -amount / 1000.0 * size * h_scale;
                    self.tm = Matrix::translate(shift, 0.0).then(&self.tm);
                }
            }
        }
        if text.trim().is_empty() {
            return;
        }

        let end = self.tm.then(&self.state.ctm);
        let (sx, sy) = start.apply(0.0, rise);
        let (ex, _) = end.apply(0.0, rise);
        let effective_size = size * start.vertical_scale();

        let (x0, baseline) = self.to_top_down(sx.min(ex), sy);
        let (x1, _) = self.to_top_down(sx.max(ex), sy);
        let bbox = Rect::new(
            x0,
            baseline - font.ascent * effective_size,
            x1,
            baseline - font.descent * effective_size,
        );

        let mut flags = font.span_flags;
        if rise > 0.0 {
            flags |= FLAG_SUPERSCRIPT;
        }

        self.runs.push(Run {
            text,
            font: font.base_name.clone(),
            size: effective_size,
            color: self.state.fill,
            flags,
            bbox,
            baseline,
        });
    }

    /// Top-down bounds of a user-space rectangle
    fn device_rect(&self, x: f32, y: f32, w: f32, h: f32) -> Rect {
        let corners = [(x, y), (x + w, y), (x, y + h), (x + w, y + h)];
        let points: Vec<(f32, f32)> = corners
            .iter()
            .map(|(cx, cy)| {
                let (px, py) = self.state.ctm.apply(*cx, *cy);
                self.to_top_down(px, py)
            })
            .collect();
        bounds(&points)
    }

    /// Drop spans already drawn that an opaque fill paints over
    fn hide_covered(&mut self, fill: &Rect) {
        let mut hidden = 0;
        for block in &mut self.blocks {
            if let Block::Text { lines, .. } = block {
                for line in lines.iter_mut() {
                    let before = line.spans.len();
                    line.spans.retain(|span| !is_covered(&span.bbox, fill));
                    hidden += before - line.spans.len();
                }
            }
        }
        if hidden == 0 {
            return;
        }
        debug!("Fill hides {} spans", hidden);
        self.blocks = std::mem::take(&mut self.blocks)
            .into_iter()
            .filter_map(rebound_block)
            .collect();
    }

    fn push_image(&mut self) {
        // Images occupy the unit square of their CTM
        let bbox = self.device_rect(0.0, 0.0, 1.0, 1.0);
        self.blocks.push(Block::Image { bbox });
    }

    fn flush_block(&mut self) {
        let runs = std::mem::take(&mut self.runs);
        if let Some(block) = group_runs(runs) {
            self.blocks.push(block);
        }
    }
}

fn bounds(points: &[(f32, f32)]) -> Rect {
    let x0 = points.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let y0 = points.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let x1 = points.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let y1 = points.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
    Rect::new(x0, y0, x1, y1)
}

fn is_covered(span: &Rect, fill: &Rect) -> bool {
    let area = span.width() * span.height();
    if area <= 0.0 {
        return false;
    }
    let w = (span.x1.min(fill.x1) - span.x0.max(fill.x0)).max(0.0);
    let h = (span.y1.min(fill.y1) - span.y0.max(fill.y0)).max(0.0);
    w * h >= HIDDEN_COVERAGE * area
}

/// Recompute line and block bounds after spans were removed; empty ones go
fn rebound_block(block: Block) -> Option<Block> {
    match block {
        Block::Text { lines, .. } => {
            let lines: Vec<TextLine> = lines
                .into_iter()
                .filter_map(|line| {
                    let bbox = line
                        .spans
                        .iter()
                        .map(|s| s.bbox)
                        .reduce(|a, b| a.union(&b))?;
                    Some(TextLine {
                        bbox,
                        spans: line.spans,
                    })
                })
                .collect();
            let bbox = lines.iter().map(|l| l.bbox).reduce(|a, b| a.union(&b))?;
            Some(Block::Text { bbox, lines })
        }
        image => Some(image),
    }
}

fn first_number(operands: &[Object]) -> f32 {
    operands.first().and_then(number).unwrap_or(0.0)
}

fn same_style(a: &TextSpan, b: &Run) -> bool {
    a.font == b.font && (a.size - b.size).abs() < 0.01 && a.color == b.color && a.flags == b.flags
}

fn span_from_run(run: Run) -> TextSpan {
    TextSpan {
        text: run.text,
        font: run.font,
        size: run.size,
        color: run.color,
        flags: run.flags,
        bbox: run.bbox,
    }
}

/// Group the runs of one text object into lines and spans
fn group_runs(runs: Vec<Run>) -> Option<Block> {
    let mut lines: Vec<(f32, Vec<TextSpan>)> = Vec::new();

    for run in runs {
        let tolerance = 0.5 + run.size * 0.1;
        let same_line = lines
            .last()
            .is_some_and(|(baseline, _)| (baseline - run.baseline).abs() <= tolerance);
        if !same_line {
            lines.push((run.baseline, vec![span_from_run(run)]));
            continue;
        }

        let Some((_, spans)) = lines.last_mut() else {
            continue;
        };
        match spans.last_mut() {
            Some(last) if same_style(last, &run) => {
                let gap = run.bbox.x0 - last.bbox.x1;
                if gap >= -0.5 * run.size && gap <= run.size {
                    if gap > 0.15 * run.size
                        && !last.text.ends_with(' ')
                        && !run.text.starts_with(' ')
                    {
                        last.text.push(' ');
                    }
                    last.text.push_str(&run.text);
                    last.bbox = last.bbox.union(&run.bbox);
                } else {
                    spans.push(span_from_run(run));
                }
            }
            _ => spans.push(span_from_run(run)),
        }
    }

    let lines: Vec<TextLine> = lines
        .into_iter()
        .filter_map(|(_, spans)| {
            let bbox = spans
                .iter()
                .map(|s| s.bbox)
                .reduce(|a, b| a.union(&b))?;
            Some(TextLine { bbox, spans })
        })
        .collect();
    let bbox = lines.iter().map(|l| l.bbox).reduce(|a, b| a.union(&b))?;
    Some(Block::Text { bbox, lines })
}

/// Font resources of a page, loaded and keyed by resource name
pub(crate) fn load_page_fonts(
    doc: &Document,
    resources: Option<&lopdf::Dictionary>,
) -> BTreeMap<Vec<u8>, (Object, PageFont)> {
    let mut fonts = BTreeMap::new();
    let Some(font_dict) = resources
        .and_then(|r| get(doc, r, b"Font"))
        .and_then(|f| as_dict(doc, f))
    else {
        return fonts;
    };
    for (key, value) in font_dict.iter() {
        if let Some(dict) = as_dict(doc, value) {
            if super::font::is_font_dict(dict) {
                fonts.insert(key.clone(), (value.clone(), PageFont::load(doc, dict)));
            }
        }
    }
    fonts
}

/// Image XObjects of a page, keyed by resource name
fn load_image_xobjects(
    doc: &Document,
    resources: Option<&lopdf::Dictionary>,
) -> BTreeMap<Vec<u8>, bool> {
    let mut xobjects = BTreeMap::new();
    let Some(dict) = resources
        .and_then(|r| get(doc, r, b"XObject"))
        .and_then(|x| as_dict(doc, x))
    else {
        return xobjects;
    };
    for (key, value) in dict.iter() {
        let is_image = as_dict(doc, value)
            .and_then(|d| get(doc, d, b"Subtype"))
            .and_then(name)
            .is_some_and(|s| s == b"Image");
        xobjects.insert(key.clone(), is_image);
    }
    xobjects
}

pub(crate) fn extract_page(
    doc: &Document,
    page_id: ObjectId,
    index: usize,
) -> Result<TextPage, EditError> {
    let media = media_box(doc, page_id);
    let resources = super::objects::inherited(doc, page_id, b"Resources").and_then(|r| match r {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    });

    let fonts: BTreeMap<Vec<u8>, PageFont> = load_page_fonts(doc, resources)
        .into_iter()
        .map(|(key, (_, font))| (key, font))
        .collect();

    let data = doc
        .get_page_content(page_id)
        .map_err(|e| EditError::ParseError(format!("page {index} content: {e}")))?;
    let content = Content::decode(&data)
        .map_err(|e| EditError::ParseError(format!("page {index} content: {e}")))?;

    let mut interpreter = Interpreter {
        fonts: &fonts,
        xobjects: load_image_xobjects(doc, resources),
        media,
        state: GraphicsState::default(),
        stack: Vec::new(),
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        in_text: false,
        runs: Vec::new(),
        blocks: Vec::new(),
        path: Vec::new(),
    };
    interpreter.run(&content);

    debug!(
        "Extracted {} blocks from page {}",
        interpreter.blocks.len(),
        index
    );

    Ok(TextPage {
        index,
        width: media[2] - media[0],
        height: media[3] - media[1],
        blocks: interpreter.blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, x0: f32, x1: f32, baseline: f32, font: &str) -> Run {
        Run {
            text: text.to_string(),
            font: font.to_string(),
            size: 12.0,
            color: 0,
            flags: 0,
            bbox: Rect::new(x0, baseline - 9.6, x1, baseline + 2.4),
            baseline,
        }
    }

    #[test]
    fn test_matrix_composition() {
        let scale = Matrix([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let shift = Matrix::translate(10.0, 5.0);
        // Scale first, then shift
        assert_eq!(scale.then(&shift).apply(1.0, 1.0), (12.0, 7.0));
        // Shift first, then scale
        assert_eq!(shift.then(&scale).apply(1.0, 1.0), (22.0, 12.0));
        assert_eq!(scale.vertical_scale(), 2.0);
    }

    #[test]
    fn test_fill_operands() {
        assert_eq!(fill_from_operands(&[Object::Integer(0)]), Some(0x000000));
        assert_eq!(fill_from_operands(&[Object::Real(1.0)]), Some(0xFFFFFF));
        assert_eq!(
            fill_from_operands(&[Object::Integer(1), Object::Integer(0), Object::Integer(0)]),
            Some(0xFF0000)
        );
        assert_eq!(
            fill_from_operands(&[
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1)
            ]),
            Some(0x000000)
        );
        assert_eq!(fill_from_operands(&[Object::Name(b"Pattern".to_vec())]), None);
    }

    #[test]
    fn test_grouping_merges_adjacent_runs() {
        let block = group_runs(vec![
            run("Invoice", 10.0, 50.0, 100.0, "Helvetica"),
            run("NO. 1", 53.0, 80.0, 100.0, "Helvetica"),
            run("Bold", 82.0, 100.0, 100.0, "Helvetica-Bold"),
            run("Next", 10.0, 30.0, 114.0, "Helvetica"),
        ])
        .unwrap();
        let Block::Text { lines, .. } = block else {
            panic!("expected a text block");
        };
        assert_eq!(lines.len(), 2);
        let texts: Vec<&str> = lines[0].spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Invoice NO. 1", "Bold"]);
        assert_eq!(lines[0].spans[0].bbox.x1, 80.0);
        assert_eq!(lines[1].spans[0].text, "Next");
    }

    #[test]
    fn test_grouping_keeps_distant_runs_apart() {
        let block = group_runs(vec![
            run("Left", 10.0, 40.0, 100.0, "Helvetica"),
            run("Right", 300.0, 340.0, 100.0, "Helvetica"),
        ])
        .unwrap();
        let Block::Text { lines, .. } = block else {
            panic!("expected a text block");
        };
        assert_eq!(lines[0].spans.len(), 2);
    }

    #[test]
    fn test_covering_fill_hides_earlier_spans() {
        assert!(is_covered(
            &Rect::new(72.0, 60.0, 100.0, 74.4),
            &Rect::new(71.99, 59.99, 100.01, 74.41)
        ));
        assert!(!is_covered(
            &Rect::new(72.0, 60.0, 100.0, 74.4),
            &Rect::new(72.0, 60.0, 80.0, 74.4)
        ));

        let fonts = BTreeMap::new();
        let mut interpreter = Interpreter {
            fonts: &fonts,
            xobjects: BTreeMap::new(),
            media: [0.0, 0.0, 612.0, 792.0],
            state: GraphicsState::default(),
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            in_text: false,
            runs: Vec::new(),
            blocks: vec![group_runs(vec![
                run("Hidden", 10.0, 50.0, 100.0, "Helvetica"),
                run("Shown", 10.0, 50.0, 200.0, "Helvetica"),
            ])
            .unwrap()],
            path: Vec::new(),
        };
        // 10..50 wide, top-down 90..103 tall: bottom-up y = 792 - 103
        let content = Content {
            operations: vec![
                lopdf::content::Operation::new(
                    "re",
                    vec![
                        Object::Real(9.0),
                        Object::Real(689.0),
                        Object::Real(42.0),
                        Object::Real(14.0),
                    ],
                ),
                lopdf::content::Operation::new("f", vec![]),
            ],
        };
        interpreter.run(&content);

        let texts: Vec<String> = interpreter
            .blocks
            .iter()
            .flat_map(|b| match b {
                Block::Text { lines, .. } => lines.clone(),
                Block::Image { .. } => Vec::new(),
            })
            .flat_map(|l| l.spans)
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["Shown".to_string()]);
    }

    #[test]
    fn test_empty_block_is_dropped() {
        assert!(group_runs(Vec::new()).is_none());
    }
}
