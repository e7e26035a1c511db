//! Artifacts - binary payloads produced by a run
//!
//! An [`Artifact`] wraps a name, an [`ObjectStream`] and an optional
//! content-type. Its [`ArtifactKind`] decides how [`Artifact::render`]
//! interprets the bytes:
//!
//! | kind       | content-types                | render                         |
//! |------------|------------------------------|--------------------------------|
//! | `Generic`  | (fallback)                   | unsupported                    |
//! | `Image`    | `image/png`, `image/jpeg`    | image bytes                    |
//! | `Video`    | `video/mp4`                  | saves to disk, `<video>` HTML  |
//! | `Csv`      | `text/csv`                   | arrow `RecordBatch`            |
//! | `Object`   | (only via [`Artifact::as_type`]) | deserialized JSON value    |
//! | `Document` | `application/pdf`            | unsupported (save only)        |
//!
//! Content and rendered values are computed at most once per instance.

mod registry;
mod set;

pub use registry::{kind_for_content_type, registered_content_types};
pub use set::ArtifactSet;

use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use arrow::compute::concat_batches;
use arrow::csv::reader::{Format, ReaderBuilder};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::ObjectStream;
use crate::{Error, Result};

/// Artifact variants, each with its own render behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Unknown content; save only
    Generic,
    /// PNG / JPEG image
    Image,
    /// MP4 video
    Video,
    /// Comma-separated table
    Csv,
    /// Serialized object (JSON payload)
    Object,
    /// PDF document; save only
    Document,
}

impl ArtifactKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 6] = [
        Self::Generic,
        Self::Image,
        Self::Video,
        Self::Csv,
        Self::Object,
        Self::Document,
    ];

    /// Content-types this kind is registered for.
    #[must_use]
    pub const fn content_types(self) -> &'static [&'static str] {
        match self {
            Self::Generic | Self::Object => &[],
            Self::Image => &["image/png", "image/jpeg"],
            Self::Video => &["video/mp4"],
            Self::Csv => &["text/csv"],
            Self::Document => &["application/pdf"],
        }
    }

    /// Display name used in `Display` output and errors.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Generic => "Artifact",
            Self::Image => "ImageArtifact",
            Self::Video => "MP4Artifact",
            Self::Csv => "CSVArtifact",
            Self::Object => "ObjectArtifact",
            Self::Document => "PDFArtifact",
        }
    }

    /// Whether [`Artifact::render`] can succeed for this kind.
    #[must_use]
    pub const fn can_render(self) -> bool {
        !matches!(self, Self::Generic | Self::Document)
    }

    const fn fixed_extension(self) -> Option<&'static str> {
        match self {
            Self::Object => Some("json"),
            _ => None,
        }
    }
}

/// Kind-specific interpretation of an artifact's bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Displayable image
    Image {
        /// Image content-type, if known
        content_type: Option<String>,
        /// Encoded image bytes
        bytes: Vec<u8>,
    },
    /// HTML snippet referencing a saved file
    Html(String),
    /// Parsed table
    Table(RecordBatch),
    /// Deserialized object
    Object(Value),
}

impl Rendered {
    /// Table, if this is a rendered CSV artifact.
    #[must_use]
    pub const fn as_table(&self) -> Option<&RecordBatch> {
        match self {
            Self::Table(batch) => Some(batch),
            _ => None,
        }
    }
}

/// A named artifact backed by an object-store stream.
#[derive(Debug)]
pub struct Artifact {
    name: String,
    kind: ArtifactKind,
    content_type: Option<String>,
    extension: String,
    stream: ObjectStream,
    content: OnceLock<Vec<u8>>,
    rendered: OnceLock<Rendered>,
}

impl Artifact {
    /// Wrap a stream as an artifact of the given kind.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        stream: ObjectStream,
        content_type: Option<String>,
        kind: ArtifactKind,
    ) -> Self {
        let extension = kind.fixed_extension().map_or_else(
            || {
                content_type
                    .as_deref()
                    .and_then(|ct| ct.rsplit('/').next())
                    .unwrap_or_default()
                    .to_string()
            },
            str::to_string,
        );
        Self {
            name: name.into(),
            kind,
            content_type,
            extension,
            stream,
            content: OnceLock::new(),
            rendered: OnceLock::new(),
        }
    }

    /// Wrap a stream, picking the kind from the content-type registry.
    ///
    /// Absent or unregistered content-types fall back to [`ArtifactKind::Generic`]
    /// and keep no content-type.
    #[must_use]
    pub fn from_content_type(
        name: impl Into<String>,
        stream: ObjectStream,
        content_type: Option<&str>,
    ) -> Self {
        match content_type.and_then(|ct| kind_for_content_type(ct).map(|k| (ct, k))) {
            Some((ct, kind)) => Self::new(name, stream, Some(ct.to_string()), kind),
            None => Self::new(name, stream, None, ArtifactKind::Generic),
        }
    }

    /// Artifact name within its run.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Artifact kind.
    #[must_use]
    pub const fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Content-type, if known.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// File extension derived from the content-type (empty if unknown).
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Raw bytes, read from the store on first access.
    ///
    /// # Errors
    /// IO errors while reading the stream.
    pub fn content(&self) -> Result<&[u8]> {
        if let Some(content) = self.content.get() {
            return Ok(content);
        }
        let mut buf = Vec::with_capacity(self.stream.len());
        self.stream.reopen().read_to_end(&mut buf)?;
        debug!(artifact = %self.name, bytes = buf.len(), "read artifact content");
        Ok(self.content.get_or_init(|| buf))
    }

    /// Kind-specific interpretation of the content, computed once.
    ///
    /// Rendering a [`ArtifactKind::Video`] artifact also saves it to the
    /// current directory, since the returned HTML references the file.
    ///
    /// # Errors
    /// - `UnsupportedRender` for generic and document artifacts
    /// - IO, CSV and JSON decoding errors
    pub fn render(&self) -> Result<&Rendered> {
        self.render_in("")
    }

    /// Like [`Artifact::render`], but video artifacts are saved into `dir`.
    ///
    /// Only the first render writes; later calls return the cached result
    /// whatever `dir` they pass.
    ///
    /// # Errors
    /// Same as [`Artifact::render`].
    pub fn render_in(&self, dir: impl AsRef<Path>) -> Result<&Rendered> {
        if let Some(rendered) = self.rendered.get() {
            return Ok(rendered);
        }
        let rendered = self.render_uncached(dir.as_ref())?;
        Ok(self.rendered.get_or_init(|| rendered))
    }

    /// Deprecated alias of [`Artifact::render`].
    ///
    /// # Errors
    /// Same as [`Artifact::render`].
    #[deprecated(note = "use `render` instead")]
    pub fn show(&self) -> Result<&Rendered> {
        warn!("`show` is deprecated in favor of `render`");
        self.render()
    }

    fn render_uncached(&self, dir: &Path) -> Result<Rendered> {
        match self.kind {
            ArtifactKind::Generic | ArtifactKind::Document => Err(Error::UnsupportedRender {
                kind: self.kind.type_name().to_string(),
            }),
            ArtifactKind::Image => Ok(Rendered::Image {
                content_type: self.content_type.clone(),
                bytes: self.content()?.to_vec(),
            }),
            ArtifactKind::Video => {
                let path = self.save(dir)?;
                Ok(Rendered::Html(format!(
                    "<video width=\"640\" height=\"480\" controls autoplay>\n  \
                     <source src=\"{}\" type=\"video/mp4\">\n</video>",
                    path.display()
                )))
            }
            ArtifactKind::Csv => read_csv(self.content()?).map(Rendered::Table),
            ArtifactKind::Object => Ok(Rendered::Object(serde_json::from_slice(self.content()?)?)),
        }
    }

    /// Filename used by [`Artifact::save`]: `{parent}_{leaf}` of the stored
    /// filename, plus `.{extension}` unless the leaf already ends with it.
    #[must_use]
    pub fn filename(&self) -> String {
        let mut parts = self.stream.filename().rsplit('/');
        let leaf = parts.next().unwrap_or_default();
        let base = match parts.next() {
            Some(parent) => format!("{parent}_{leaf}"),
            None => leaf.to_string(),
        };
        if leaf.ends_with(&self.extension) {
            base
        } else {
            format!("{base}.{}", self.extension)
        }
    }

    /// Write the raw bytes to `dir` (created if needed). An empty path means
    /// the current directory. Existing files are overwritten.
    ///
    /// # Errors
    /// IO errors while reading the stream or writing the file.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
        let path = dir.join(self.filename());
        std::fs::write(&path, self.content()?)?;
        debug!(artifact = %self.name, path = %path.display(), "saved artifact");
        Ok(path)
    }

    /// Re-interpret as the kind registered for `content_type`.
    ///
    /// # Errors
    /// `NoContentTypeMapping` if no kind is registered for `content_type`.
    pub fn as_content_type(&self, content_type: &str) -> Result<Self> {
        let kind = kind_for_content_type(content_type)
            .ok_or_else(|| Error::NoContentTypeMapping(content_type.to_string()))?;
        Ok(Self::new(
            self.name.clone(),
            self.stream.reopen(),
            Some(content_type.to_string()),
            kind,
        ))
    }

    /// Re-interpret as `kind`: a new artifact over the same payload, read from
    /// the start, with its own content and render caches.
    ///
    /// The content-type is kept if `kind` declares it, otherwise the first
    /// content-type `kind` declares is used (none for kinds without one).
    #[must_use]
    pub fn as_type(&self, kind: ArtifactKind) -> Self {
        let declared = kind.content_types();
        let content_type = match self.content_type.as_deref() {
            Some(ct) if declared.contains(&ct) => Some(ct.to_string()),
            _ => declared.first().map(|ct| (*ct).to_string()),
        };
        Self::new(self.name.clone(), self.stream.reopen(), content_type, kind)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(name={})", self.kind.type_name(), self.name)
    }
}

fn read_csv(bytes: &[u8]) -> Result<RecordBatch> {
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(Cursor::new(bytes), None)?;
    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_format(format)
        .build(Cursor::new(bytes))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};

    fn stream(filename: &str, bytes: &[u8]) -> ObjectStream {
        ObjectStream::new(filename, None, Arc::from(bytes))
    }

    fn csv_artifact() -> Artifact {
        Artifact::from_content_type(
            "predictions",
            stream("artifact://runs/3/predictions", b"label,score\ncat,1\ndog,2\n"),
            Some("text/csv"),
        )
    }

    #[test]
    fn test_kind_selection_from_content_type() {
        let png = Artifact::from_content_type("cm", stream("a/1/cm", b"x"), Some("image/png"));
        assert_eq!(png.kind(), ArtifactKind::Image);
        assert_eq!(png.extension(), "png");

        let unknown = Artifact::from_content_type("w", stream("a/1/w", b"x"), Some("foo/bar"));
        assert_eq!(unknown.kind(), ArtifactKind::Generic);
        assert_eq!(unknown.extension(), "");
        assert_eq!(unknown.content_type(), None);
    }

    #[test]
    fn test_render_video_saves_and_embeds() {
        let dir = tempfile::tempdir().unwrap();
        let clip = Artifact::from_content_type(
            "clip",
            stream("artifact://runs/7/clip", b"\x00\x00\x00\x18ftypmp42"),
            Some("video/mp4"),
        );
        assert_eq!(clip.kind(), ArtifactKind::Video);

        let expected = dir.path().join("7_clip.mp4");
        let Rendered::Html(html) = clip.render_in(dir.path()).unwrap() else {
            panic!("video should render as html");
        };
        assert!(html.starts_with("<video"));
        assert!(html.contains(&format!("<source src=\"{}\" type=\"video/mp4\">", expected.display())));
        assert_eq!(std::fs::read(&expected).unwrap(), b"\x00\x00\x00\x18ftypmp42");

        // Cached: a second render does not write again
        std::fs::remove_file(&expected).unwrap();
        assert!(matches!(clip.render().unwrap(), Rendered::Html(_)));
        assert!(!expected.exists());
    }

    #[test]
    fn test_render_csv_as_table() {
        let artifact = csv_artifact();
        let table = artifact.render().unwrap().as_table().unwrap();
        assert_eq!(table.num_rows(), 2);
        let labels = table
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(labels.value(1), "dog");
        let scores = table
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(scores.value(0), 1);
    }

    #[test]
    fn test_render_is_cached() {
        let artifact = csv_artifact();
        let first: *const Rendered = artifact.render().unwrap();
        let second: *const Rendered = artifact.render().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_generic_and_document_render_unsupported() {
        let generic = Artifact::from_content_type("blob", stream("a/1/blob", b"x"), None);
        assert!(matches!(
            generic.render(),
            Err(Error::UnsupportedRender { ref kind }) if kind == "Artifact"
        ));

        let pdf = Artifact::from_content_type("r", stream("a/1/r.pdf", b"%PDF"), Some("application/pdf"));
        assert!(!pdf.kind().can_render());
        assert!(matches!(pdf.render(), Err(Error::UnsupportedRender { .. })));
    }

    #[test]
    fn test_as_type_twice_yields_independent_equal_renders() {
        let raw = Artifact::from_content_type(
            "predictions_obj",
            stream("artifact://runs/3/predictions_obj", br#"{"accuracy": 0.9}"#),
            None,
        );
        // Consume the original's content first: re-interpretation must still see all bytes
        assert!(!raw.content().unwrap().is_empty());

        let first = raw.as_type(ArtifactKind::Object);
        let second = raw.as_type(ArtifactKind::Object);
        assert_eq!(first.kind(), ArtifactKind::Object);
        assert_eq!(first.render().unwrap(), second.render().unwrap());
        assert_eq!(
            first.render().unwrap(),
            &Rendered::Object(serde_json::json!({"accuracy": 0.9}))
        );
        assert_eq!(first.extension(), "json");
    }

    #[test]
    fn test_as_content_type() {
        let raw = Artifact::from_content_type(
            "predictions",
            stream("artifact://runs/3/predictions", b"a\n1\n"),
            None,
        );
        let csv = raw.as_content_type("text/csv").unwrap();
        assert_eq!(csv.kind(), ArtifactKind::Csv);
        assert_eq!(csv.content_type(), Some("text/csv"));
        assert_eq!(csv.render().unwrap().as_table().unwrap().num_rows(), 1);

        let err = raw.as_content_type("application/x-unknown").unwrap_err();
        assert!(
            matches!(err, Error::NoContentTypeMapping(ref ct) if ct == "application/x-unknown")
        );
    }

    #[test]
    fn test_filename_convention() {
        let png = Artifact::from_content_type(
            "confusion_matrix",
            stream("artifact://runs/1/confusion_matrix", b"x"),
            Some("image/png"),
        );
        assert_eq!(png.filename(), "1_confusion_matrix.png");

        let pdf = Artifact::from_content_type(
            "confusion_matrix.pdf",
            stream("artifact://runs/1/confusion_matrix.pdf", b"x"),
            Some("application/pdf"),
        );
        assert_eq!(pdf.filename(), "1_confusion_matrix.pdf");

        let bare = Artifact::from_content_type("notes", stream("notes", b"x"), None);
        assert_eq!(bare.filename(), "notes");
    }

    #[test]
    fn test_save_writes_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested");
        let artifact = csv_artifact();
        let path = artifact.save(&target).unwrap();
        assert_eq!(path, target.join("3_predictions.csv"));
        assert_eq!(std::fs::read(&path).unwrap(), b"label,score\ncat,1\ndog,2\n");
        // Repeated saves overwrite with identical content
        artifact.save(&target).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 24);
    }

    #[test]
    fn test_image_render_and_display() {
        let png = Artifact::from_content_type(
            "cm",
            stream("a/1/cm", &[0x89, b'P', b'N', b'G']),
            Some("image/png"),
        );
        assert_eq!(png.to_string(), "ImageArtifact(name=cm)");
        match png.render().unwrap() {
            Rendered::Image { content_type, bytes } => {
                assert_eq!(content_type.as_deref(), Some("image/png"));
                assert_eq!(bytes.len(), 4);
            }
            other => panic!("unexpected render: {other:?}"),
        }
        assert_eq!(png.content().unwrap().len(), 4);
        assert!(png.content_type().is_some());
    }
}
