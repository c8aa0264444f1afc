//! Single-pass XML validation
//!
//! Each file is read once, forward only, through a `quick_xml` tokenizer. No
//! document tree is built. Well-formedness and the `Application` script checks
//! run inline as events arrive, driven by a small state machine:
//!
//! ```text
//! Start -> Parsing -> (DOCTYPE Application) -> ApplicationDocument -> Finished
//!              \_______________________________________________/
//! ```
//!
//! In `ApplicationDocument` every `Application` element, at any depth, has its
//! script attributes resolved against the [`ScriptReferenceIndex`]. The first
//! well-formedness failure emits one diagnostic and ends the scan of that file;
//! tokenizer state is not trusted past a syntax error.
//!
//! Content is decoded with the encoding named by the XML declaration (or a byte
//! order mark), so `windows-1252`, `ISO-8859-1` and friends validate like UTF-8.
//! Failure locations point at the offending byte of the raw input.
//!
//! Malformed input never produces an `Err`. Only failing to read the file does.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::ops::Range;

use quick_xml::escape::{EscapeError, resolve_predefined_entity, unescape_with};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Decoder, Reader};

use crate::diagnostic::{DiagnosticRecord, Location};
use crate::error::Result;
use crate::file_discovery::FileReference;
use crate::script_index::{ScriptLookup, ScriptReferenceIndex};

/// Document type and element name that enable the script checks
pub const APPLICATION: &str = "Application";

/// Attributes of `Application` that must name an existing script
pub const SCRIPT_ATTRIBUTES: [&str; 3] = ["preScript", "postScript", "provisioningScript"];

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

// Bytes between the token start and the content quick-xml hands back.
const TAG_OPEN: u64 = 1; // <
const PI_OPEN: u64 = 2; // <?
const COMMENT_OPEN: u64 = 4; // <!--
const CDATA_OPEN: u64 = 9; // <![CDATA[

/// Validate one discovered file.
pub fn validate_file(
    file: &FileReference,
    index: &ScriptReferenceIndex,
) -> Result<Vec<DiagnosticRecord>> {
    let handle = File::open(file.path())?;
    Ok(validate_reader(file.relative(), handle, index)?)
}

/// Validate XML from any byte source, reporting locations against `file`.
pub fn validate_reader<R: Read>(
    file: &str,
    source: R,
    index: &ScriptReferenceIndex,
) -> io::Result<Vec<DiagnosticRecord>> {
    let mut reader = Reader::from_reader(BufReader::new(PositionTracker::new(source)));
    reader.config_mut().check_comments = true;

    let mut scanner = DocumentScanner::new(file, index);
    let mut buf = Vec::new();

    loop {
        // The declaration switches the decoder for the events after it.
        let token = Token {
            start: reader.buffer_position(),
            decoder: reader.decoder(),
        };

        let step = match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => {
                let end = reader.buffer_position();
                scanner.finish(position(&reader, file, end));
                break;
            }
            Ok(event) => {
                scanner.on_event(event, &token, || position(&reader, file, token.start))
            }
            Err(e) => Err(StepError::from(e).at(reader.error_position().max(token.start))),
        };

        match step {
            Ok(()) => {}
            Err(StepError::Malformed { details, offset }) => {
                let offset = offset.unwrap_or(token.start);
                scanner.fail(position(&reader, file, offset), details);
                break;
            }
            Err(StepError::Io(e)) => return Err(e),
        }
        buf.clear();
    }

    Ok(scanner.into_diagnostics())
}

fn position<R>(
    reader: &Reader<BufReader<PositionTracker<R>>>,
    file: &str,
    offset: u64,
) -> Location {
    let (line, column) = reader.get_ref().get_ref().line_column(offset);
    Location::new(file, line, column)
}

/// Records where lines start while bytes stream through it.
struct PositionTracker<R> {
    inner: R,
    consumed: u64,
    bom: u64,
    line_starts: Vec<u64>,
}

impl<R> PositionTracker<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            consumed: 0,
            bom: 0,
            line_starts: vec![0],
        }
    }

    /// 1-based line and byte column of a tokenizer offset already read.
    ///
    /// The tokenizer drops a UTF-8 byte order mark without counting it, so
    /// offsets are shifted past it and the first line starts after it.
    fn line_column(&self, offset: u64) -> (u32, u32) {
        let offset = offset + self.bom;
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self
            .line_starts
            .get(line.saturating_sub(1))
            .copied()
            .unwrap_or(0);
        (
            u32::try_from(line.max(1)).unwrap_or(u32::MAX),
            u32::try_from(offset.saturating_sub(line_start) + 1).unwrap_or(u32::MAX),
        )
    }
}

impl<R: Read> Read for PositionTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.consumed == 0 && buf[..n].starts_with(&UTF8_BOM) {
            self.bom = UTF8_BOM.len() as u64;
            self.line_starts[0] = self.bom;
        }
        for (i, byte) in buf[..n].iter().enumerate() {
            if *byte == b'\n' {
                self.line_starts.push(self.consumed + i as u64 + 1);
            }
        }
        self.consumed += n as u64;
        Ok(n)
    }
}

enum StepError {
    /// `offset` is where the input went wrong; `None` means the token start.
    Malformed {
        details: String,
        offset: Option<u64>,
    },
    Io(io::Error),
}

impl StepError {
    fn malformed(details: impl Into<String>) -> Self {
        StepError::Malformed {
            details: details.into(),
            offset: None,
        }
    }

    fn malformed_at(offset: u64, details: impl Into<String>) -> Self {
        StepError::Malformed {
            details: details.into(),
            offset: Some(offset),
        }
    }

    /// Pins a failure that has no position of its own to `offset`.
    fn at(self, offset: u64) -> Self {
        match self {
            StepError::Malformed {
                details,
                offset: None,
            } => StepError::malformed_at(offset, details),
            other => other,
        }
    }
}

impl From<quick_xml::Error> for StepError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(e) => StepError::Io(io::Error::new(e.kind(), e.to_string())),
            other => StepError::malformed(other.to_string()),
        }
    }
}

type Step = std::result::Result<(), StepError>;
type Decoded<'a> = std::result::Result<Cow<'a, str>, StepError>;

/// Where the event being checked starts and how its bytes decode
struct Token {
    start: u64,
    decoder: Decoder,
}

impl Token {
    /// Absolute offset of byte `index` of content that begins `skip` bytes into the token
    fn offset(&self, skip: u64, index: usize) -> u64 {
        self.start + skip + index as u64
    }

    /// Raw length of a decoded prefix
    fn encoded_len(&self, prefix: &str) -> usize {
        self.decoder.encoding().encode(prefix).0.len()
    }

    fn decode<'b>(&self, raw: &'b [u8], skip: u64) -> Decoded<'b> {
        self.decoder.decode(raw).map_err(|_| {
            let encoding = self.decoder.encoding().name();
            let valid = match std::str::from_utf8(raw) {
                Err(e) if encoding == "UTF-8" => e.valid_up_to(),
                _ => 0,
            };
            StepError::malformed_at(
                self.offset(skip, valid),
                format!("input is not valid {}", encoding),
            )
        })
    }

    fn check_characters(&self, content: &str, skip: u64) -> Step {
        match find_invalid_character(content) {
            Some((index, c)) => Err(StepError::malformed_at(
                self.offset(skip, self.encoded_len(&content[..index])),
                invalid_character(c),
            )),
            None => Ok(()),
        }
    }

    /// Expands entity and character references in decoded `content`.
    fn unescape<'s>(&self, content: &'s str, skip: u64) -> Decoded<'s> {
        let unescaped = unescape_with(content, accept_entity).map_err(|e| {
            let error = StepError::malformed(e.to_string());
            match escape_position(&e) {
                Some(index) => error.at(self.offset(skip, self.encoded_len(&content[..index]))),
                None => error,
            }
        })?;

        // A character reference may name a character that is not allowed literally.
        if let Cow::Owned(expanded) = &unescaped
            && let Some((_, c)) = find_invalid_character(expanded)
        {
            return Err(StepError::malformed(invalid_character(c)));
        }
        Ok(unescaped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Start,
    Parsing,
    ApplicationDocument,
    Finished,
}

struct DocumentScanner<'i> {
    file: &'i str,
    index: &'i ScriptReferenceIndex,
    state: ScanState,
    open_elements: Vec<String>,
    doctype_seen: bool,
    root_seen: bool,
    diagnostics: Vec<DiagnosticRecord>,
}

impl<'i> DocumentScanner<'i> {
    fn new(file: &'i str, index: &'i ScriptReferenceIndex) -> Self {
        Self {
            file,
            index,
            state: ScanState::Start,
            open_elements: Vec::new(),
            doctype_seen: false,
            root_seen: false,
            diagnostics: Vec::new(),
        }
    }

    /// `location` resolves the token start, only needed when findings are recorded.
    fn on_event(
        &mut self,
        event: Event<'_>,
        token: &Token,
        location: impl FnOnce() -> Location,
    ) -> Step {
        if self.state == ScanState::Start {
            self.state = ScanState::Parsing;
        }

        match event {
            Event::Decl(_) => {
                if token.start != 0 {
                    return Err(StepError::malformed(
                        "XML declaration allowed only at the start of the document",
                    ));
                }
                Ok(())
            }
            Event::DocType(doctype) => {
                if self.root_seen {
                    return Err(StepError::malformed(
                        "document type declaration after the root element",
                    ));
                }
                if self.doctype_seen {
                    return Err(StepError::malformed(
                        "document has more than one document type declaration",
                    ));
                }
                self.doctype_seen = true;

                let declaration = String::from_utf8_lossy(&doctype);
                let name = declaration
                    .trim_start()
                    .split(|c: char| c.is_whitespace() || c == '[')
                    .next()
                    .unwrap_or_default();
                if name == APPLICATION {
                    self.state = ScanState::ApplicationDocument;
                }
                Ok(())
            }
            Event::Start(start) => self.on_element(&start, token, location, false),
            Event::Empty(start) => self.on_element(&start, token, location, true),
            Event::End(_) => {
                if self.open_elements.pop().is_none() {
                    return Err(StepError::malformed("unexpected end tag"));
                }
                Ok(())
            }
            Event::Text(text) => {
                if self.open_elements.is_empty() && !text.iter().all(|b| is_xml_whitespace(*b)) {
                    return Err(StepError::malformed(
                        "text content outside of the root element",
                    ));
                }
                if let Some(index) = text.windows(3).position(|w| w == b"]]>") {
                    return Err(StepError::malformed_at(
                        token.offset(0, index),
                        "']]>' is not allowed in character data",
                    ));
                }
                let content = token.decode(&text, 0)?;
                token.check_characters(&content, 0)?;
                token.unescape(&content, 0)?;
                Ok(())
            }
            Event::CData(cdata) => {
                let content = token.decode(&cdata, CDATA_OPEN)?;
                token.check_characters(&content, CDATA_OPEN)
            }
            Event::Comment(comment) => {
                let content = token.decode(&comment, COMMENT_OPEN)?;
                token.check_characters(&content, COMMENT_OPEN)
            }
            Event::PI(instruction) => {
                let content = token.decode(&instruction, PI_OPEN)?;
                token.check_characters(&content, PI_OPEN)
            }
            // End of input is handled by the caller.
            _ => Ok(()),
        }
    }

    fn on_element(
        &mut self,
        start: &BytesStart<'_>,
        token: &Token,
        location: impl FnOnce() -> Location,
        empty: bool,
    ) -> Step {
        if self.open_elements.is_empty() {
            if self.root_seen {
                return Err(StepError::malformed(
                    "document has more than one root element",
                ));
            }
            self.root_seen = true;
        }

        let raw: &[u8] = start;
        let tag = token.decode(raw, TAG_OPEN)?;
        token.check_characters(&tag, TAG_OPEN)?;

        let values = quoted_values(raw);
        let less_than = values.iter().find_map(|range| {
            raw[range.clone()]
                .iter()
                .position(|b| *b == b'<')
                .map(|index| range.start + index)
        });
        if let Some(index) = less_than {
            return Err(StepError::malformed_at(
                token.offset(TAG_OPEN, index),
                "'<' is not allowed in attribute values",
            ));
        }

        let is_application = start.name().as_ref() == APPLICATION.as_bytes();
        let mut attributes = Vec::new();
        for (position, attribute) in start.attributes().enumerate() {
            let attribute = attribute.map_err(|e| {
                StepError::malformed_at(
                    token.offset(TAG_OPEN, attribute_error_position(&e)),
                    format!("invalid attribute: {}", e),
                )
            })?;
            let skip = TAG_OPEN + values.get(position).map_or(0, |range| range.start as u64);
            let value = token.decode(&attribute.value, skip)?;
            let value = token.unescape(&value, skip)?;
            if is_application {
                let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
                attributes.push((key, value.into_owned()));
            }
        }

        if is_application && self.state == ScanState::ApplicationDocument {
            self.check_script_attributes(&attributes, &location());
        }

        if !empty {
            self.open_elements
                .push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        }
        Ok(())
    }

    fn check_script_attributes(&mut self, attributes: &[(String, String)], location: &Location) {
        for name in SCRIPT_ATTRIBUTES {
            let Some((_, value)) = attributes.iter().find(|(key, _)| key == name) else {
                self.diagnostics
                    .push(DiagnosticRecord::missing_script_attribute(location.clone(), name));
                continue;
            };

            match self.index.resolve(value) {
                ScriptLookup::Missing => self.diagnostics.push(
                    DiagnosticRecord::missing_script_file(location.clone(), name, value),
                ),
                ScriptLookup::CasingMismatch { canonical } => {
                    self.diagnostics
                        .push(DiagnosticRecord::inconsistent_script_casing(
                            location.clone(),
                            name,
                            value,
                            canonical,
                        ))
                }
                ScriptLookup::Found => {}
            }
        }
    }

    fn fail(&mut self, location: Location, details: String) {
        self.diagnostics
            .push(DiagnosticRecord::not_well_formed(location, details));
        self.state = ScanState::Finished;
    }

    fn finish(&mut self, end: Location) {
        if let Some(open) = self.open_elements.last() {
            let details = format!("unexpected end of file, element <{}> is not closed", open);
            self.fail(end, details);
        } else if !self.root_seen {
            self.fail(end, "no root element".to_string());
        }
        self.state = ScanState::Finished;
    }

    fn into_diagnostics(self) -> Vec<DiagnosticRecord> {
        debug_assert_eq!(self.state, ScanState::Finished, "scan of {} did not finish", self.file);
        self.diagnostics
    }
}

/// External DTDs are not loaded, so any syntactically valid named entity is accepted.
fn accept_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or_else(|| is_name(name).then_some(""))
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'))
}

fn escape_position(error: &EscapeError) -> Option<usize> {
    match error {
        EscapeError::UnrecognizedEntity(range, _) | EscapeError::UnterminatedEntity(range) => {
            Some(range.start)
        }
        EscapeError::InvalidCharRef(_) => None,
    }
}

fn attribute_error_position(error: &AttrError) -> usize {
    match *error {
        AttrError::ExpectedEq(position)
        | AttrError::ExpectedValue(position)
        | AttrError::UnquotedValue(position)
        | AttrError::ExpectedQuote(position, _)
        | AttrError::Duplicated(position, _) => position,
    }
}

/// Byte ranges of the quoted attribute values in a raw start tag, in order
fn quoted_values(raw: &[u8]) -> Vec<Range<usize>> {
    let mut values = Vec::new();
    let mut open: Option<(u8, usize)> = None;
    for (index, byte) in raw.iter().enumerate() {
        match open {
            Some((quote, start)) if *byte == quote => {
                values.push(start..index);
                open = None;
            }
            Some(_) => {}
            None if matches!(byte, b'"' | b'\'') => open = Some((*byte, index + 1)),
            None => {}
        }
    }
    values
}

fn is_xml_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

fn find_invalid_character(content: &str) -> Option<(usize, char)> {
    content.char_indices().find(|(_, c)| !is_xml_char(*c))
}

fn invalid_character(c: char) -> String {
    format!("invalid character U+{:04X}", c as u32)
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..
    )
}
