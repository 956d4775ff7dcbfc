use anyhow::{anyhow, Context};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

/// Flat, lossless view of one XML part. Markup round-trips byte-for-byte except for
/// text escaping, which is normalized to the minimal `&amp;`/`&lt;`/`&gt;` set.
#[derive(Clone, Debug)]
pub enum XmlEvent {
    Decl {
        version: String,
        encoding: Option<String>,
        standalone: Option<String>,
    },
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
    },
    CData {
        text: String,
    },
    Comment {
        text: String,
    },
    PI {
        content: String,
    },
    DocType {
        text: String,
    },
}

#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
}

impl XmlPart {
    pub fn parse(name: &str, xml_bytes: &[u8]) -> anyhow::Result<Self> {
        let mut reader = Reader::from_reader(xml_bytes);
        reader.config_mut().trim_text(false);

        let mut events: Vec<XmlEvent> = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let ev = reader
                .read_event_into(&mut buf)
                .with_context(|| format!("read xml event in {name}"))?;
            match ev {
                Event::Eof => break,
                Event::Decl(d) => {
                    let version = bytes_to_string(d.version().context("decl version")?);
                    let encoding = d.encoding().and_then(|r| r.ok()).map(bytes_to_string);
                    let standalone = d.standalone().and_then(|r| r.ok()).map(bytes_to_string);
                    events.push(XmlEvent::Decl {
                        version,
                        encoding,
                        standalone,
                    });
                }
                Event::Start(s) => events.push(XmlEvent::Start {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                }),
                Event::End(e) => events.push(XmlEvent::End {
                    name: bytes_to_string(e.name().as_ref()),
                }),
                Event::Empty(s) => events.push(XmlEvent::Empty {
                    name: bytes_to_string(s.name().as_ref()),
                    attrs: collect_attrs(&s)?,
                }),
                Event::Text(t) => {
                    let text = t.unescape().context("unescape text")?.into_owned();
                    events.push(XmlEvent::Text { text });
                }
                Event::CData(t) => events.push(XmlEvent::CData {
                    text: bytes_to_string(t.into_inner()),
                }),
                Event::Comment(t) => events.push(XmlEvent::Comment {
                    text: bytes_to_string(t.into_inner()),
                }),
                Event::PI(t) => {
                    let target = bytes_to_string(t.target());
                    let content = bytes_to_string(t.content());
                    events.push(XmlEvent::PI {
                        content: format!("{target}{content}"),
                    });
                }
                Event::DocType(t) => events.push(XmlEvent::DocType {
                    text: bytes_to_string(t.into_inner()),
                }),
            }
        }

        Ok(Self {
            name: name.to_string(),
            events,
        })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut out: Vec<u8> = Vec::new();
        for ev in &self.events {
            match ev {
                XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                } => {
                    let d = BytesDecl::new(
                        version.as_str(),
                        encoding.as_deref(),
                        standalone.as_deref(),
                    );
                    let mut writer = quick_xml::Writer::new(Vec::new());
                    writer.write_event(Event::Decl(d)).context("write decl")?;
                    out.extend_from_slice(&writer.into_inner());
                }
                XmlEvent::Start { name, attrs } => write_start_like(&mut out, name, attrs, false),
                XmlEvent::End { name } => {
                    out.extend_from_slice(b"</");
                    out.extend_from_slice(name.as_bytes());
                    out.extend_from_slice(b">");
                }
                XmlEvent::Empty { name, attrs } => write_start_like(&mut out, name, attrs, true),
                XmlEvent::Text { text } => escape_text_into(&mut out, text),
                XmlEvent::CData { text } => {
                    out.extend_from_slice(b"<![CDATA[");
                    out.extend_from_slice(text.as_bytes());
                    out.extend_from_slice(b"]]>");
                }
                XmlEvent::Comment { text } => {
                    out.extend_from_slice(b"<!--");
                    out.extend_from_slice(text.as_bytes());
                    out.extend_from_slice(b"-->");
                }
                XmlEvent::PI { content } => {
                    out.extend_from_slice(b"<?");
                    out.extend_from_slice(content.as_bytes());
                    out.extend_from_slice(b"?>");
                }
                XmlEvent::DocType { text } => {
                    out.extend_from_slice(b"<!DOCTYPE");
                    out.extend_from_slice(text.as_bytes());
                    out.extend_from_slice(b">");
                }
            }
        }
        Ok(out)
    }

    /// Replaces the content of the `Text` event at `index`.
    pub fn set_text(&mut self, index: usize, new_text: &str) -> anyhow::Result<()> {
        match self.events.get_mut(index) {
            Some(XmlEvent::Text { text }) => {
                *text = new_text.to_string();
                Ok(())
            }
            _ => Err(anyhow!("expected Text event at {index} in {}", self.name)),
        }
    }

    /// Sets (or adds) an attribute on the start/empty element at `index`.
    pub fn set_attr(&mut self, index: usize, key: &str, value: &str) -> anyhow::Result<()> {
        match self.events.get_mut(index) {
            Some(XmlEvent::Start { attrs, .. }) | Some(XmlEvent::Empty { attrs, .. }) => {
                match attrs.iter_mut().find(|(k, _)| k == key) {
                    Some((_, v)) => *v = value.to_string(),
                    None => attrs.push((key.to_string(), value.to_string())),
                }
                Ok(())
            }
            _ => Err(anyhow!("expected element at {index} in {}", self.name)),
        }
    }

    /// Hash of everything except the content of text-bearing elements and `xml:space`.
    /// Two parts with equal hashes differ at most in visible run text.
    pub fn structure_hash(&self) -> String {
        let mut hasher = Sha256::new();
        let mut stack: Vec<&str> = Vec::new();

        for ev in &self.events {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    stack.push(name.as_str());
                    hash_element(&mut hasher, name, attrs);
                }
                XmlEvent::Empty { name, attrs } => {
                    hash_element(&mut hasher, name, attrs);
                    hash_tagged(&mut hasher, b"E:", name);
                }
                XmlEvent::End { name } => {
                    hash_tagged(&mut hasher, b"E:", name);
                    stack.pop();
                }
                XmlEvent::Text { text } => {
                    if stack.last().is_some_and(|cur| is_text_tag(cur)) {
                        continue;
                    }
                    hash_tagged(&mut hasher, b"T:", text);
                }
                XmlEvent::Decl {
                    version,
                    encoding,
                    standalone,
                } => {
                    let decl = format!(
                        "{version}|{}|{}",
                        encoding.as_deref().unwrap_or(""),
                        standalone.as_deref().unwrap_or("")
                    );
                    hash_tagged(&mut hasher, b"D:", &decl);
                }
                XmlEvent::CData { text } => hash_tagged(&mut hasher, b"C:", text),
                XmlEvent::Comment { text } => hash_tagged(&mut hasher, b"M:", text),
                XmlEvent::PI { content } => hash_tagged(&mut hasher, b"P:", content),
                XmlEvent::DocType { text } => hash_tagged(&mut hasher, b"Y:", text),
            }
        }
        hex::encode(hasher.finalize())
    }
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    let mut attrs: Vec<(String, String)> = Vec::new();
    for a in s.attributes() {
        let a = a.context("attr")?;
        // Values stay escaped: character references such as `&#xD;` must survive verbatim.
        attrs.push((
            bytes_to_string(a.key.as_ref()),
            bytes_to_string(a.value.as_ref()),
        ));
    }
    Ok(attrs)
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

fn escape_text_into(out: &mut Vec<u8>, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            _ => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn write_start_like(out: &mut Vec<u8>, name: &str, attrs: &[(String, String)], empty: bool) {
    out.extend_from_slice(b"<");
    out.extend_from_slice(name.as_bytes());
    for (k, v) in attrs {
        out.extend_from_slice(b" ");
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(b"=\"");
        out.extend_from_slice(v.as_bytes());
        out.extend_from_slice(b"\"");
    }
    let close: &[u8] = if empty { b"/>" } else { b">" };
    out.extend_from_slice(close);
}

fn is_text_tag(name: &str) -> bool {
    name == "w:t" || name == "w:delText"
}

fn hash_element(hasher: &mut Sha256, name: &str, attrs: &[(String, String)]) {
    hasher.update(b"S:");
    hasher.update(name.as_bytes());
    hasher.update(b"|");
    let mut sorted: Vec<&(String, String)> =
        attrs.iter().filter(|(k, _)| k != "xml:space").collect();
    sorted.sort();
    for (k, v) in sorted {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"\n");
}

fn hash_tagged(hasher: &mut Sha256, tag: &[u8], body: &str) {
    hasher.update(tag);
    hasher.update(body.as_bytes());
    hasher.update(b"\n");
}
