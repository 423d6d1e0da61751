/// Markup loader: file discovery, structured parsing, and the permissive
/// regex fallback used when a file is not well-formed.

use log::debug;
use once_cell::sync::Lazy;
use quick_xml::events::attributes::AttrError;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::text::collapse_whitespace;
use crate::schema::markup::{Element, DOCUMENT_TAG};
use crate::schema::outcome::ShipOutcomeKind;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("markup error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("attribute error: {0}")]
    Attr(#[from] AttrError),
    #[error("unbalanced markup: {0}")]
    Unbalanced(String),
}

/// Path fragments that mark a file as a localized variant. Localized
/// files load last so their events replace the base-language ones.
const LOCALIZATION_MARKERS: [&str; 6] = ["zh", "简体", "chinese", "chs", "cn", "汉化"];

/// Named events and ship outcome loads recovered from a file that failed
/// structured parsing. Carries no structure: no ancestry, no references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackScan {
    /// `(name, flattened text)` in source order.
    pub events: Vec<(String, String)>,
    /// `(ship name, outcome kind, load target)` in source order.
    pub ship_loads: Vec<(String, ShipOutcomeKind, String)>,
}

#[derive(Debug, Clone)]
pub enum SourceContent {
    Parsed(Arc<Element>),
    Fallback(FallbackScan),
}

/// One discovered corpus file and what could be recovered from it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: SourceContent,
}

impl SourceFile {
    pub fn tree(&self) -> Option<&Arc<Element>> {
        match &self.content {
            SourceContent::Parsed(root) => Some(root),
            SourceContent::Fallback(_) => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self.content, SourceContent::Parsed(_))
    }
}

/// Sort key placing localized files after everything else. The marker
/// check only looks at the path below the corpus root.
pub fn language_preference_key(root: &Path, path: &Path) -> (u8, String) {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let localized = rel.components().any(|c| match c {
        Component::Normal(part) => {
            let part = part.to_string_lossy().to_lowercase();
            LOCALIZATION_MARKERS.iter().any(|m| part.contains(m))
        }
        _ => false,
    });
    (u8::from(localized), path.to_string_lossy().to_lowercase())
}

fn is_markup_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".xml") || name.ends_with(".xml.append")
}

/// Every markup file under `root`, in load order.
pub fn discover(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_markup_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort_by_cached_key(|p| language_preference_key(root, p));
    files
}

/// Parse markup text into a tree rooted at a synthetic document element.
/// Files may hold several top-level elements.
pub fn parse_markup(source: &str) -> Result<Element, LoadError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut reader = Reader::from_str(source);
    reader.trim_text(false);

    // Open elements, each with its finished children. Children are kept
    // owned until the parent closes so trailing text can land in a tail.
    let mut stack: Vec<(Element, Vec<Element>)> = vec![(Element::new(DOCUMENT_TAG), Vec::new())];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let el = start_element(&e)?;
                stack.push((el, Vec::new()));
            }
            Event::Empty(e) => {
                let el = start_element(&e)?;
                if let Some((_, children)) = stack.last_mut() {
                    children.push(el);
                }
            }
            Event::End(e) => {
                if stack.len() < 2 {
                    return Err(LoadError::Unbalanced(format!(
                        "unexpected closing tag </{}>",
                        String::from_utf8_lossy(e.local_name().as_ref())
                    )));
                }
                if let Some((mut el, children)) = stack.pop() {
                    el.children = children.into_iter().map(Arc::new).collect();
                    if let Some((_, siblings)) = stack.last_mut() {
                        siblings.push(el);
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                push_text(&mut stack, &text);
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        let open: Vec<String> = stack.iter().skip(1).map(|(el, _)| el.tag.clone()).collect();
        return Err(LoadError::Unbalanced(format!(
            "unclosed elements: {}",
            open.join(" > ")
        )));
    }
    match stack.pop() {
        Some((mut doc, children)) => {
            doc.children = children.into_iter().map(Arc::new).collect();
            Ok(doc)
        }
        None => Err(LoadError::Unbalanced("empty document stack".to_string())),
    }
}

fn start_element(e: &quick_xml::events::BytesStart<'_>) -> Result<Element, LoadError> {
    let mut el = Element::new(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn push_text(stack: &mut [(Element, Vec<Element>)], text: &str) {
    if let Some((el, children)) = stack.last_mut() {
        match children.last_mut() {
            Some(last) => last.tail.push_str(text),
            None => el.text.push_str(text),
        }
    }
}

static EVENT_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<event\b(?P<attrs>[^>]*)>(?P<body>.*?)</event>").expect("static regex"));
static SHIP_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<ship\b(?P<attrs>[^>]*)>(?P<body>.*?)</ship>").expect("static regex"));
static NAME_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bname\s*=\s*"([^"]+)""#).expect("static regex"));
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static OUTCOME_LOAD_RES: Lazy<Vec<(ShipOutcomeKind, Regex)>> = Lazy::new(|| {
    ShipOutcomeKind::ALL
        .into_iter()
        .map(|kind| {
            let pattern = format!(r#"(?i)<{}[^>]*load="([^"]+)""#, kind.tag());
            (kind, Regex::new(&pattern).expect("static regex"))
        })
        .collect()
});

/// Entity-unescape, leaving the text as-is if it holds an unknown entity.
fn unescape_lossy(s: &str) -> Cow<'_, str> {
    match quick_xml::escape::unescape(s) {
        Ok(text) => text,
        Err(_) => Cow::Borrowed(s),
    }
}

/// Best-effort scan of raw markup: named event blocks with their text
/// flattened, and ship outcome load targets.
pub fn fallback_scan(source: &str) -> FallbackScan {
    let mut scan = FallbackScan::default();

    for caps in EVENT_BLOCK_RE.captures_iter(source) {
        let attrs = caps.name("attrs").map_or("", |m| m.as_str());
        let Some(name) = NAME_ATTR_RE.captures(attrs).and_then(|c| c.get(1)) else {
            continue;
        };
        let body = caps.name("body").map_or("", |m| m.as_str());
        let body = COMMENT_RE.replace_all(body, "");
        let body = TAG_RE.replace_all(&body, " ");
        let text = collapse_whitespace(&unescape_lossy(&body));
        scan.events
            .push((unescape_lossy(name.as_str()).into_owned(), text));
    }

    for caps in SHIP_BLOCK_RE.captures_iter(source) {
        let attrs = caps.name("attrs").map_or("", |m| m.as_str());
        let Some(name) = NAME_ATTR_RE.captures(attrs).and_then(|c| c.get(1)) else {
            continue;
        };
        let ship = unescape_lossy(name.as_str()).into_owned();
        let body = caps.name("body").map_or("", |m| m.as_str());
        for (kind, re) in OUTCOME_LOAD_RES.iter() {
            if let Some(target) = re.captures(body).and_then(|c| c.get(1)) {
                scan.ship_loads.push((
                    ship.clone(),
                    *kind,
                    unescape_lossy(target.as_str()).into_owned(),
                ));
            }
        }
    }

    scan
}

/// Load one file, falling back to the regex scan when structured parsing
/// fails. Only an unreadable file is an error.
pub fn load_file(path: &Path) -> Result<SourceFile, LoadError> {
    let bytes = std::fs::read(path)?;
    let parsed = match String::from_utf8(bytes) {
        Ok(source) => match parse_markup(&source) {
            Ok(root) => Ok(root),
            Err(err) => Err((source, err)),
        },
        Err(err) => {
            let source = String::from_utf8_lossy(err.as_bytes()).into_owned();
            Err((source, LoadError::from(err)))
        }
    };

    let content = match parsed {
        Ok(root) => SourceContent::Parsed(Arc::new(root)),
        Err((source, err)) => {
            debug!("{}: structured parse failed ({err}), using fallback scan", path.display());
            SourceContent::Fallback(fallback_scan(&source))
        }
    };
    Ok(SourceFile {
        path: path.to_path_buf(),
        content,
    })
}

/// Load every markup file under `root` in load order. Unreadable files are
/// logged and skipped.
pub fn load_corpus(root: &Path) -> Vec<SourceFile> {
    discover(root)
        .into_iter()
        .filter_map(|path| match load_file(&path) {
            Ok(file) => Some(file),
            Err(err) => {
                debug!("{}: skipped ({err})", path.display());
                None
            }
        })
        .collect()
}
