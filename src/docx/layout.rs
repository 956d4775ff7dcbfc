use super::xml::{XmlEvent, XmlPart};

/// Where a paragraph lives. Table coordinates are zero-based and count only top-level tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParaContainer {
    DocumentBody,
    TableCell { table: usize, row: usize, cell: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunPiece {
    /// `w:t` content: `elem_index` is the `w:t` start event, `text_index` the text event.
    Text {
        elem_index: usize,
        text_index: usize,
        text: String,
    },
    /// Tab, break or non-breaking hyphen rendered as a single character.
    Control(char),
}

#[derive(Clone, Debug, Default)]
pub struct RunNode {
    pub pieces: Vec<RunPiece>,
}

impl RunNode {
    pub fn text(&self) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                RunPiece::Text { text, .. } => out.push_str(text),
                RunPiece::Control(ch) => out.push(*ch),
            }
        }
        out
    }
}

#[derive(Clone, Debug)]
pub struct ParagraphNode {
    pub event_index: usize,
    pub container: ParaContainer,
    pub runs: Vec<RunNode>,
}

impl ParagraphNode {
    pub fn text(&self) -> String {
        self.runs.iter().map(RunNode::text).collect()
    }
}

/// Paragraph → run → text-node tree of the main document part in reading order:
/// every body paragraph first, then every top-level table cell paragraph row by row.
#[derive(Clone, Debug, Default)]
pub struct DocumentLayout {
    pub paragraphs: Vec<ParagraphNode>,
}

impl DocumentLayout {
    pub fn from_part(part: &XmlPart) -> Self {
        let mut body: Vec<ParagraphNode> = Vec::new();
        let mut cells: Vec<ParagraphNode> = Vec::new();
        let mut walker = Walker::default();

        for (idx, ev) in part.events.iter().enumerate() {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    walker.open(idx, name, attrs, false, &mut body, &mut cells);
                    walker.stack.push(name.clone());
                }
                XmlEvent::Empty { name, attrs } => {
                    walker.open(idx, name, attrs, true, &mut body, &mut cells);
                }
                XmlEvent::Text { text } => walker.text(idx, text),
                XmlEvent::End { name } => {
                    walker.close(name, &mut body, &mut cells);
                    walker.stack.pop();
                }
                _ => {}
            }
        }

        body.extend(cells);
        Self { paragraphs: body }
    }
}

#[derive(Default)]
struct Walker {
    stack: Vec<String>,
    tbl_depth: usize,
    table_count: usize,
    row_count: usize,
    cell_count: usize,
    para: Option<ParaCapture>,
}

struct ParaCapture {
    node: ParagraphNode,
    p_depth: usize,
    hyperlink_depth: Option<usize>,
    run: Option<(RunNode, usize)>,
    t_elem: Option<(usize, usize)>,
}

impl Walker {
    fn parent(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or("")
    }

    fn open(
        &mut self,
        idx: usize,
        name: &str,
        attrs: &[(String, String)],
        empty: bool,
        body: &mut Vec<ParagraphNode>,
        cells: &mut Vec<ParagraphNode>,
    ) {
        let depth = self.stack.len();
        let parent = self.parent().to_string();

        match name {
            "w:tbl" if !empty => {
                if parent == "w:body" && self.tbl_depth == 0 {
                    self.table_count += 1;
                    self.row_count = 0;
                }
                self.tbl_depth += 1;
            }
            "w:tr" if self.tbl_depth == 1 && parent == "w:tbl" => {
                self.row_count += 1;
                self.cell_count = 0;
            }
            "w:tc" if self.tbl_depth == 1 && parent == "w:tr" => {
                self.cell_count += 1;
            }
            "w:p" => {
                let container = if parent == "w:body" && self.tbl_depth == 0 {
                    Some(ParaContainer::DocumentBody)
                } else if parent == "w:tc" && self.tbl_depth == 1 {
                    Some(ParaContainer::TableCell {
                        table: self.table_count.saturating_sub(1),
                        row: self.row_count.saturating_sub(1),
                        cell: self.cell_count.saturating_sub(1),
                    })
                } else {
                    None
                };
                if let Some(container) = container {
                    let node = ParagraphNode {
                        event_index: idx,
                        container,
                        runs: Vec::new(),
                    };
                    if empty {
                        push_paragraph(node, body, cells);
                    } else {
                        self.para = Some(ParaCapture {
                            node,
                            p_depth: depth + 1,
                            hyperlink_depth: None,
                            run: None,
                            t_elem: None,
                        });
                    }
                }
                return;
            }
            _ => {}
        }

        let Some(cap) = self.para.as_mut() else {
            return;
        };
        match name {
            "w:hyperlink" if !empty && parent == "w:p" && depth == cap.p_depth => {
                cap.hyperlink_depth = Some(depth + 1);
            }
            "w:r" if !empty => {
                let direct = parent == "w:p" && depth == cap.p_depth;
                let linked = parent == "w:hyperlink" && cap.hyperlink_depth == Some(depth);
                if direct || linked {
                    cap.run = Some((RunNode::default(), depth + 1));
                }
            }
            "w:t" if !empty => {
                if let Some((_, r_depth)) = cap.run.as_ref() {
                    if parent == "w:r" && depth == *r_depth {
                        cap.t_elem = Some((idx, depth + 1));
                    }
                }
            }
            _ => {
                if let Some((run, r_depth)) = cap.run.as_mut() {
                    if parent == "w:r" && depth == *r_depth {
                        if let Some(ch) = control_char(name, attrs) {
                            run.pieces.push(RunPiece::Control(ch));
                        }
                    }
                }
            }
        }
    }

    fn text(&mut self, idx: usize, text: &str) {
        let Some(cap) = self.para.as_mut() else {
            return;
        };
        if let (Some((elem_index, _)), Some((run, _))) = (cap.t_elem, cap.run.as_mut()) {
            run.pieces.push(RunPiece::Text {
                elem_index,
                text_index: idx,
                text: text.to_string(),
            });
        }
    }

    fn close(&mut self, name: &str, body: &mut Vec<ParagraphNode>, cells: &mut Vec<ParagraphNode>) {
        let depth = self.stack.len();
        if name == "w:tbl" && self.tbl_depth > 0 {
            self.tbl_depth -= 1;
            return;
        }
        let Some(cap) = self.para.as_mut() else {
            return;
        };
        let mut finished = false;
        match name {
            "w:t" if cap.t_elem.is_some_and(|(_, d)| d == depth) => cap.t_elem = None,
            "w:r" if cap.run.as_ref().is_some_and(|(_, d)| *d == depth) => {
                if let Some((run, _)) = cap.run.take() {
                    cap.node.runs.push(run);
                }
            }
            "w:hyperlink" if cap.hyperlink_depth == Some(depth) => cap.hyperlink_depth = None,
            "w:p" if cap.p_depth == depth => finished = true,
            _ => {}
        }
        if finished {
            if let Some(cap) = self.para.take() {
                push_paragraph(cap.node, body, cells);
            }
        }
    }
}

fn push_paragraph(node: ParagraphNode, body: &mut Vec<ParagraphNode>, cells: &mut Vec<ParagraphNode>) {
    match node.container {
        ParaContainer::DocumentBody => body.push(node),
        ParaContainer::TableCell { .. } => cells.push(node),
    }
}

fn control_char(name: &str, attrs: &[(String, String)]) -> Option<char> {
    match name {
        "w:tab" | "w:ptab" => Some('\t'),
        "w:cr" => Some('\n'),
        "w:br" => {
            let br_type = attrs
                .iter()
                .find(|(k, _)| k == "w:type")
                .map(|(_, v)| v.as_str());
            (br_type.unwrap_or("textWrapping") == "textWrapping").then_some('\n')
        }
        "w:noBreakHyphen" => Some('-'),
        _ => None,
    }
}
