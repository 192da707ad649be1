//! `multipart/form-data` uploads.
//!
//! [`MultipartForm::parse`] splits a buffered body into text fields, which
//! go to the input schema like a URL-encoded form, and [`File`]s, which an
//! [`InputStage`](crate::InputStage) checks against per-field [`FileRule`]s
//! and injects as [`UploadedFiles`].
//!
//! Client filenames are untrusted. [`secure_filename`] reduces one to a
//! bare, printable basename; [`validate_filename`] either rejects a name
//! that needed changing or replaces it with the reduced form.

use std::io;

use bytes::Bytes;
use dyne_core::Request;
use multer::{Constraints, SizeLimit};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Content type that selects multipart parsing.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// Default maximum total body size (50 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Default maximum size per field (10 MB).
pub const DEFAULT_MAX_FIELD_SIZE: usize = 10 * 1024 * 1024;

/// Parsing limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Maximum total body size in bytes.
    pub max_body_size: usize,
    /// Maximum size of one field in bytes.
    pub max_field_size: usize,
    /// Maximum number of fields.
    pub max_fields: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_fields: 100,
        }
    }
}

impl MultipartConfig {
    /// Sets the maximum body size.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Sets the maximum field size.
    #[must_use]
    pub fn max_field_size(mut self, size: usize) -> Self {
        self.max_field_size = size;
        self
    }

    /// Sets the maximum number of fields.
    #[must_use]
    pub fn max_fields(mut self, count: usize) -> Self {
        self.max_fields = count;
        self
    }
}

/// The body is not acceptable multipart data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    /// No usable boundary in `Content-Type`.
    #[error("missing or invalid multipart boundary")]
    Boundary,
    /// Body larger than the configured limit.
    #[error("multipart body of {actual} bytes exceeds {limit}")]
    TooLarge {
        /// Configured limit.
        limit: usize,
        /// Body length.
        actual: usize,
    },
    /// More fields than the configured limit.
    #[error("too many multipart fields (max {0})")]
    TooManyFields(usize),
    /// A part is malformed, too large, or not UTF-8 where text was expected.
    #[error("multipart parse error: {0}")]
    Parse(String),
}

/// A client filename that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilenameError {
    /// The part carried no filename.
    #[error("filename is missing")]
    Missing,
    /// Nothing usable is left of the name.
    #[error("invalid filename")]
    Invalid,
    /// The name contains control characters.
    #[error("filename contains control characters")]
    ControlCharacters,
    /// The name differs from its safe form and sanitizing is off.
    #[error("filename contains unsafe characters")]
    Unsafe,
}

/// Reduces a client filename to a safe basename.
///
/// Without `allow_unicode` the name is NFKD-folded to ASCII (`résumé` becomes
/// `resume`); with it, NFC-normalized. Directory components and surrounding
/// whitespace are dropped, and only word characters, `.`, `-` and spaces are
/// kept.
///
/// ```
/// use dyne_pipeline::secure_filename;
///
/// assert_eq!(secure_filename("../../etc/passwd", false).unwrap(), "passwd");
/// assert_eq!(secure_filename("résumé.pdf", false).unwrap(), "resume.pdf");
/// assert_eq!(secure_filename("résumé.pdf", true).unwrap(), "résumé.pdf");
/// assert!(secure_filename("..", false).is_err());
/// ```
pub fn secure_filename(name: &str, allow_unicode: bool) -> Result<String, FilenameError> {
    if name.is_empty() {
        return Err(FilenameError::Invalid);
    }
    let normalized: String = if allow_unicode {
        name.nfc().collect()
    } else {
        name.nfkd().filter(char::is_ascii).collect()
    };

    let base = normalized.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if matches!(base, "" | "." | "..") {
        return Err(FilenameError::Invalid);
    }
    if base.chars().any(|c| (c as u32) < 32) {
        return Err(FilenameError::ControlCharacters);
    }

    let cleaned: String = base
        .chars()
        .filter(|&c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | ' '))
        .collect();
    if matches!(cleaned.trim(), "" | "." | "..") {
        return Err(FilenameError::Invalid);
    }
    Ok(cleaned)
}

/// Checks an uploaded file's name.
///
/// A name whose safe form differs is rejected, or replaced when `sanitize`
/// is set.
pub fn validate_filename(file: &mut File, sanitize: bool) -> Result<(), FilenameError> {
    let original = file.filename.as_deref().filter(|n| !n.is_empty()).ok_or(FilenameError::Missing)?;
    let safe = secure_filename(original, false)?;
    if safe != original {
        if !sanitize {
            return Err(FilenameError::Unsafe);
        }
        file.filename = Some(safe);
    }
    Ok(())
}

/// One uploaded file, held in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct File {
    field: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Bytes,
}

impl File {
    /// Builds a file as a form part would carry it.
    pub fn new(field: impl Into<String>, filename: Option<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            field: field.into(),
            filename,
            content_type,
            data,
        }
    }

    /// Form field the file was sent under.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Client filename, after any sanitizing.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Declared content type of the part.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Lowercased extension without the dot; empty when there is none.
    #[must_use]
    pub fn extension(&self) -> String {
        let name = self.filename.as_deref().unwrap_or_default();
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// File contents.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Writes the contents to `dest`.
    pub fn save_to(&self, mut dest: impl io::Write) -> io::Result<()> {
        dest.write_all(&self.data)?;
        dest.flush()
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("field", &self.field)
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Checks applied to the files of one form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRule {
    required: bool,
    sanitize: bool,
    max_size: Option<usize>,
    allowed_extensions: Option<Vec<String>>,
}

impl FileRule {
    /// No checks beyond filename validation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The field must carry at least one file.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Replace unsafe filenames instead of rejecting them.
    #[must_use]
    pub fn sanitize(mut self) -> Self {
        self.sanitize = true;
        self
    }

    /// Largest accepted size in bytes.
    #[must_use]
    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Accepted extensions, case-insensitive, with or without the dot.
    #[must_use]
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed: Vec<String> = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        allowed.sort();
        allowed.dedup();
        self.allowed_extensions = Some(allowed);
        self
    }

    /// Whether the field must carry a file.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Checks one file, sanitizing its name if configured. Returns the
    /// messages of every failed check.
    pub fn check(&self, file: &mut File) -> Vec<String> {
        let mut problems = Vec::new();
        if let Err(e) = validate_filename(file, self.sanitize) {
            problems.push(e.to_string());
        }
        if let Some(max) = self.max_size {
            if file.size() > max {
                problems.push(format!("file too large ({} bytes), maximum is {max}", file.size()));
            }
        }
        if let Some(allowed) = &self.allowed_extensions {
            let ext = file.extension();
            if !allowed.contains(&ext) {
                problems.push(format!("invalid type '.{ext}', allowed: {}", allowed.join(", ")));
            }
        }
        problems
    }
}

/// Files of one request, in the order they were sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadedFiles {
    files: Vec<File>,
}

impl UploadedFiles {
    /// First file sent under `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&File> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Every file sent under `field`.
    pub fn all<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a File> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }

    /// Every file.
    pub fn iter(&self) -> impl Iterator<Item = &File> {
        self.files.iter()
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// No files were sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl From<Vec<File>> for UploadedFiles {
    fn from(files: Vec<File>) -> Self {
        Self { files }
    }
}

impl IntoIterator for UploadedFiles {
    type Item = File;
    type IntoIter = std::vec::IntoIter<File>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

/// A parsed `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    /// Parts without a filename, as text.
    pub fields: Vec<(String, String)>,
    /// Parts with a filename.
    pub files: Vec<File>,
}

impl MultipartForm {
    /// Whether the request declares a multipart body.
    pub fn is_multipart(req: &Request) -> bool {
        req.content_type().as_deref() == Some(MULTIPART_CONTENT_TYPE)
    }

    /// Parses the buffered request body.
    pub async fn parse(req: &Request, config: &MultipartConfig) -> Result<Self, MultipartError> {
        let content_type = req.header("content-type").ok_or(MultipartError::Boundary)?;
        let boundary = multer::parse_boundary(content_type).map_err(|_| MultipartError::Boundary)?;

        let body = req.body().clone();
        if body.len() > config.max_body_size {
            return Err(MultipartError::TooLarge {
                limit: config.max_body_size,
                actual: body.len(),
            });
        }

        let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
        let constraints = Constraints::new().size_limit(
            SizeLimit::new()
                .whole_stream(config.max_body_size as u64)
                .per_field(config.max_field_size as u64),
        );
        let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

        let mut form = Self::default();
        let mut count = 0;
        while let Some(field) = multipart.next_field().await.map_err(parse_error)? {
            count += 1;
            if count > config.max_fields {
                return Err(MultipartError::TooManyFields(config.max_fields));
            }
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(ToString::to_string);
                    let data = field.bytes().await.map_err(parse_error)?;
                    form.files.push(File::new(name, Some(filename), content_type, data));
                }
                None => {
                    let text = field.text().await.map_err(parse_error)?;
                    form.fields.push((name, text));
                }
            }
        }
        tracing::trace!(fields = form.fields.len(), files = form.files.len(), "multipart body parsed");
        Ok(form)
    }
}

fn parse_error(e: multer::Error) -> MultipartError {
    MultipartError::Parse(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn upload(filename: &str) -> File {
        File::new("doc", Some(filename.to_string()), None, Bytes::from_static(b"dummy"))
    }

    fn form_request(body: &str) -> Request {
        Request::new(Method::POST, "/upload".parse().unwrap())
            .with_header("content-type", "multipart/form-data; boundary=XBOUND")
            .with_body(body.replace('\n', "\r\n"))
    }

    #[test]
    fn test_unsafe_filenames_are_rejected() {
        for name in ["../secret.txt", "file\nname.txt", "résumé.pdf", " file.txt ", "file?.txt", "", ".", ".."] {
            let mut file = upload(name);
            assert!(validate_filename(&mut file, false).is_err(), "{name:?} was accepted");
            assert_eq!(file.filename(), Some(name));
        }
    }

    #[test]
    fn test_unsafe_filenames_are_sanitized() {
        for (name, safe) in [
            ("../secret.txt", "secret.txt"),
            ("résumé.pdf", "resume.pdf"),
            (" file.txt ", "file.txt"),
            ("file?.txt", "file.txt"),
        ] {
            let mut file = upload(name);
            validate_filename(&mut file, true).unwrap();
            assert_eq!(file.filename(), Some(safe));
        }
    }

    #[test]
    fn test_sanitizing_cannot_rescue_everything() {
        assert_eq!(
            validate_filename(&mut upload("bad\u{7}.txt"), true),
            Err(FilenameError::ControlCharacters)
        );
        assert_eq!(validate_filename(&mut upload("dir/.."), true), Err(FilenameError::Invalid));
        assert_eq!(validate_filename(&mut upload("???"), true), Err(FilenameError::Invalid));

        let mut nameless = File::new("doc", None, None, Bytes::new());
        assert_eq!(validate_filename(&mut nameless, true), Err(FilenameError::Missing));
    }

    #[test]
    fn test_secure_filename_keeps_safe_names() {
        assert_eq!(secure_filename("report-2024_v2.final.pdf", false).unwrap(), "report-2024_v2.final.pdf");
        assert_eq!(secure_filename("C:\\Users\\me\\notes.txt", false).unwrap(), "notes.txt");
        assert_eq!(secure_filename("ﬁle.txt", false).unwrap(), "file.txt");
    }

    #[test]
    fn test_file_rule_collects_every_problem() {
        let rule = FileRule::new().max_size(3).extensions([".PNG", "jpg"]);
        let mut file = upload("notes.txt");
        let problems = rule.check(&mut file);
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("file too large (5 bytes)"));
        assert_eq!(problems[1], "invalid type '.txt', allowed: jpg, png");

        assert!(FileRule::new().extensions(["txt"]).check(&mut upload("NOTES.TXT")).is_empty());
    }

    #[test]
    fn test_extension() {
        assert_eq!(upload("archive.tar.GZ").extension(), "gz");
        assert_eq!(upload(".bashrc").extension(), "");
        assert_eq!(upload("README").extension(), "");
    }

    #[tokio::test]
    async fn test_parse_splits_fields_and_files() {
        let req = form_request(
            "--XBOUND\n\
             Content-Disposition: form-data; name=\"title\"\n\
             \n\
             holiday\n\
             --XBOUND\n\
             Content-Disposition: form-data; name=\"photo\"; filename=\"beach.png\"\n\
             Content-Type: image/png\n\
             \n\
             PNGDATA\n\
             --XBOUND--\n",
        );
        assert!(MultipartForm::is_multipart(&req));
        let form = MultipartForm::parse(&req, &MultipartConfig::default()).await.unwrap();
        assert_eq!(form.fields, vec![("title".to_string(), "holiday".to_string())]);
        assert_eq!(form.files.len(), 1);
        let photo = &form.files[0];
        assert_eq!(photo.field(), "photo");
        assert_eq!(photo.filename(), Some("beach.png"));
        assert_eq!(photo.content_type(), Some("image/png"));
        assert_eq!(photo.data().as_ref(), b"PNGDATA");

        let mut saved = Vec::new();
        photo.save_to(&mut saved).unwrap();
        assert_eq!(saved, b"PNGDATA");
    }

    #[tokio::test]
    async fn test_parse_enforces_limits() {
        let body = "--XBOUND\n\
                    Content-Disposition: form-data; name=\"a\"\n\
                    \n\
                    1\n\
                    --XBOUND\n\
                    Content-Disposition: form-data; name=\"b\"\n\
                    \n\
                    2\n\
                    --XBOUND--\n";
        let req = form_request(body);
        let err = MultipartForm::parse(&req, &MultipartConfig::default().max_fields(1)).await.unwrap_err();
        assert_eq!(err, MultipartError::TooManyFields(1));

        let err = MultipartForm::parse(&req, &MultipartConfig::default().max_body_size(10)).await.unwrap_err();
        assert!(matches!(err, MultipartError::TooLarge { limit: 10, .. }));

        let no_boundary = Request::new(Method::POST, "/upload".parse().unwrap())
            .with_header("content-type", "multipart/form-data")
            .with_body(body);
        let err = MultipartForm::parse(&no_boundary, &MultipartConfig::default()).await.unwrap_err();
        assert_eq!(err, MultipartError::Boundary);
    }
}
