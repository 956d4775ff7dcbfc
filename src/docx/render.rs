use std::collections::{BTreeSet, HashMap};

use crate::docx::layout::{DocumentLayout, RunPiece};
use crate::docx::package::DocxPackage;
use crate::docx::xml::XmlPart;
use crate::error::RenderError;
use crate::placeholder::{TokenMatcher, PLACEHOLDER_RE};

/// A freshly serialized document plus what happened to the tokens in it.
#[derive(Clone, Debug)]
pub struct Materialized {
    pub bytes: Vec<u8>,
    /// Number of token occurrences replaced.
    pub substitutions: usize,
    /// Tokens with a value that were left in place because formatting split them across
    /// text nodes, sorted.
    pub split_tokens: Vec<String>,
}

/// Substitutes `values` into a copy of `document` and returns the new bytes.
pub fn render(document: &[u8], values: &HashMap<String, String>) -> Result<Vec<u8>, RenderError> {
    materialize(document, values).map(|m| m.bytes)
}

/// Run-scoped substitution: a token is replaced only where its whole text sits inside a
/// single `w:t` node of one run, so surrounding run formatting is never touched. Tokens
/// that formatting split apart are reported in `split_tokens`, not merged.
pub fn materialize(
    document: &[u8],
    values: &HashMap<String, String>,
) -> Result<Materialized, RenderError> {
    let pkg = DocxPackage::from_bytes(document).map_err(RenderError::Unreadable)?;
    let main = pkg
        .main_document()
        .map_err(|_| RenderError::MissingMainPart)?;
    let mut part = XmlPart::parse(&main.name, &main.data).map_err(RenderError::Unreadable)?;

    if values.is_empty() {
        return Ok(Materialized {
            bytes: document.to_vec(),
            substitutions: 0,
            split_tokens: Vec::new(),
        });
    }

    let baseline = part.structure_hash();
    let layout = DocumentLayout::from_part(&part);
    let para_texts: Vec<String> = layout.paragraphs.iter().map(|p| p.text()).collect();

    // Unfilled tokens join the alternation so a filled token never matches inside a longer one.
    let Some(matcher) = TokenMatcher::new(
        para_texts
            .iter()
            .flat_map(|t| PLACEHOLDER_RE.find_iter(t).map(|m| m.as_str()))
            .chain(values.keys().map(String::as_str)),
    ) else {
        return Ok(Materialized {
            bytes: document.to_vec(),
            substitutions: 0,
            split_tokens: Vec::new(),
        });
    };

    let mut substitutions = 0usize;
    let mut split: BTreeSet<String> = BTreeSet::new();

    for (para, para_text) in layout.paragraphs.iter().zip(&para_texts) {
        // Occurrences with a value still waiting to be replaced in this paragraph.
        let mut pending: HashMap<&str, usize> = HashMap::new();
        for tok in matcher.find_all(para_text) {
            if values.contains_key(tok) {
                *pending.entry(tok).or_default() += 1;
            }
        }
        if pending.is_empty() {
            continue;
        }

        for run in &para.runs {
            for piece in &run.pieces {
                let RunPiece::Text {
                    elem_index,
                    text_index,
                    text,
                } = piece
                else {
                    continue;
                };
                let mut replaced_any = false;
                let replaced = matcher.replace_all(text, |tok| match values.get(tok) {
                    Some(value) => {
                        substitutions += 1;
                        replaced_any = true;
                        if let Some(n) = pending.get_mut(tok) {
                            *n = n.saturating_sub(1);
                        }
                        value.clone()
                    }
                    None => tok.to_string(),
                });
                if !replaced_any {
                    continue;
                }
                part.set_text(*text_index, &replaced)
                    .map_err(RenderError::Write)?;
                if needs_space_preserve(&replaced) {
                    part.set_attr(*elem_index, "xml:space", "preserve")
                        .map_err(RenderError::Write)?;
                }
            }
        }
        split.extend(
            pending
                .into_iter()
                .filter(|(_, n)| *n > 0)
                .map(|(tok, _)| tok.to_string()),
        );
    }

    if part.structure_hash() != baseline {
        return Err(RenderError::StructureChanged {
            part: part.name.clone(),
        });
    }

    let xml = part.to_bytes().map_err(RenderError::Write)?;
    let mut replacements = HashMap::new();
    replacements.insert(part.name.clone(), xml);
    let bytes = pkg
        .to_bytes_with_replacements(&replacements)
        .map_err(RenderError::Write)?;

    Ok(Materialized {
        bytes,
        substitutions,
        split_tokens: split.into_iter().collect(),
    })
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{materialize, render};
    use crate::docx::package::{DocxPackage, MAIN_DOCUMENT_PART};
    use crate::docx::testutil::{bold_run, build_docx, paragraph, raw_paragraph, run, table};
    use crate::error::RenderError;
    use crate::placeholder::scan;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn main_xml(bytes: &[u8]) -> String {
        let pkg = DocxPackage::from_bytes(bytes).expect("package");
        String::from_utf8(pkg.main_document().expect("main").data.clone()).expect("utf8")
    }

    #[test]
    fn single_run_token_round_trips() {
        let doc = build_docx(&paragraph(&["Client: {X}"]));
        let out = render(&doc, &values(&[("{X}", "Acme")])).expect("render");

        let rescanned = scan(&out).expect("rescan");
        assert!(rescanned.full_text.contains("Acme"));
        assert!(!rescanned.full_text.contains("{X}"));
        assert!(rescanned.is_empty());
    }

    #[test]
    fn caller_bytes_are_not_mutated() {
        let doc = build_docx(&paragraph(&["{X}"]));
        let before = doc.clone();
        let _ = render(&doc, &values(&[("{X}", "Acme")])).expect("render");
        assert_eq!(doc, before);
    }

    #[test]
    fn formatting_of_other_runs_is_kept() {
        let body = raw_paragraph(&format!(
            "{}{}{}",
            bold_run("Dear "),
            run("{Name}"),
            bold_run(", welcome")
        ));
        let out = render(&build_docx(&body), &values(&[("{Name}", "Ada")])).expect("render");
        let xml = main_xml(&out);
        assert!(xml.contains(r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Dear </w:t></w:r>"#));
        assert!(xml.contains(r#"<w:r><w:t xml:space="preserve">Ada</w:t></w:r>"#));
        assert!(xml.contains(r#"<w:t xml:space="preserve">, welcome</w:t>"#));
    }

    #[test]
    fn tokens_split_across_runs_are_left_and_reported() {
        let body = raw_paragraph(&format!("{}{}", run("{Cli"), bold_run("ent} and [Date]")));
        let m = materialize(&build_docx(&body), &values(&[("{Client}", "Acme"), ("[Date]", "today")]))
            .expect("materialize");
        assert_eq!(m.split_tokens, vec!["{Client}".to_string()]);
        assert_eq!(m.substitutions, 1);
        let text = scan(&m.bytes).expect("rescan").full_text;
        assert_eq!(text, "{Client} and today");
    }

    #[test]
    fn table_cells_are_substituted() {
        let body = format!("{}{}", paragraph(&["Intro"]), table(&[&["[Date]", "<Sig>"]]));
        let out = render(&build_docx(&body), &values(&[("[Date]", "1 May"), ("<Sig>", "J. Doe")]))
            .expect("render");
        let xml = main_xml(&out);
        assert!(xml.contains(">1 May<"));
        assert!(xml.contains(">J. Doe<"));
        assert!(!xml.contains("&lt;Sig&gt;"));
    }

    #[test]
    fn partial_map_leaves_unfilled_tokens() {
        let doc = build_docx(&paragraph(&["{A} and {B}"]));
        let out = render(&doc, &values(&[("{A}", "one")])).expect("render");
        let rescanned = scan(&out).expect("rescan");
        assert_eq!(rescanned.placeholders, vec!["{B}"]);
        assert_eq!(rescanned.full_text, "one and {B}");
    }

    #[test]
    fn filled_token_does_not_eat_into_longer_unfilled_one() {
        let doc = build_docx(&paragraph(&["Fee $fee, total $fee_total"]));
        let m = materialize(&doc, &values(&[("$fee", "100")])).expect("materialize");
        assert_eq!(m.substitutions, 1);
        let rescanned = scan(&m.bytes).expect("rescan");
        assert_eq!(rescanned.full_text, "Fee 100, total $fee_total");
        assert_eq!(rescanned.placeholders, vec!["$fee_total"]);
    }

    #[test]
    fn second_occurrence_split_by_formatting_is_reported() {
        let body = raw_paragraph(&format!("{}{}{}", run("{A} and {"), bold_run("A"), run("}")));
        let m = materialize(&build_docx(&body), &values(&[("{A}", "x")])).expect("materialize");
        assert_eq!(m.substitutions, 1);
        assert_eq!(m.split_tokens, vec!["{A}".to_string()]);
        assert_eq!(scan(&m.bytes).expect("rescan").full_text, "x and {A}");
    }

    #[test]
    fn values_with_markup_characters_are_escaped() {
        let doc = build_docx(&paragraph(&["{A}"]));
        let out = render(&doc, &values(&[("{A}", "R&D <team>")])).expect("render");
        assert!(main_xml(&out).contains("R&amp;D &lt;team&gt;"));
        assert_eq!(scan(&out).expect("rescan").full_text, "R&D <team>");
    }

    #[test]
    fn empty_value_map_returns_a_copy() {
        let doc = build_docx(&paragraph(&["{A}"]));
        let m = materialize(&doc, &HashMap::new()).expect("materialize");
        assert_eq!(m.bytes, doc);
        assert_eq!(m.substitutions, 0);
    }

    #[test]
    fn unreadable_input_is_a_render_error() {
        assert!(matches!(
            render(b"nope", &values(&[("{A}", "a")])),
            Err(RenderError::Unreadable(_))
        ));
    }

    #[test]
    fn other_parts_survive_rewrite() {
        let doc = build_docx(&paragraph(&["{A}"]));
        let out = render(&doc, &values(&[("{A}", "a")])).expect("render");
        let before = DocxPackage::from_bytes(&doc).expect("before");
        let after = DocxPackage::from_bytes(&out).expect("after");
        for ent in &before.entries {
            if ent.name == MAIN_DOCUMENT_PART {
                continue;
            }
            assert_eq!(after.entry(&ent.name).expect("entry").data, ent.data);
        }
    }
}
