//! Accumulation of packed frames and templated asset output.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ConversionConfig, HardwareProfile};
use crate::error::{ConvertError, Result};
use crate::packing::{PackedFrame, PackingMode};

/// Number of placeholders a template is filled with.
pub const FIELD_COUNT: usize = 8;

const BUILTIN_TEMPLATE: &str = include_str!("../template/movie_data.h.in");

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(usize),
}

/// A text template with positional placeholders.
///
/// `{}` takes the next field, `{N}` takes field `N`; `{{` and `}}` are
/// literal braces. Fields are, in order: mode label, active bit width,
/// output height, target fps, frame count, centering offset, packing
/// dimension keyword and the frame array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut auto_index = 0usize;
        let mut numbering: Option<bool> = None; // Some(true) = auto, Some(false) = explicit
        let mut chars = text.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if chars.peek().map(|(_, c)| *c) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(ConvertError::InvalidTemplate(format!(
                            "unclosed '{{' at byte {pos}"
                        )));
                    }

                    let auto = name.trim().is_empty();
                    if numbering.is_some_and(|prev| prev != auto) {
                        return Err(ConvertError::InvalidTemplate(
                            "cannot mix automatic and explicit field numbering".into(),
                        ));
                    }
                    numbering = Some(auto);

                    let index = if auto {
                        auto_index += 1;
                        auto_index - 1
                    } else if name.contains([':', '!']) {
                        return Err(ConvertError::InvalidTemplate(format!(
                            "format specs are not supported in '{{{name}}}' at byte {pos}; fields are inserted as text"
                        )));
                    } else {
                        name.trim().parse::<usize>().map_err(|_| {
                            ConvertError::InvalidTemplate(format!(
                                "unsupported placeholder '{{{name}}}' at byte {pos}"
                            ))
                        })?
                    };
                    if index >= FIELD_COUNT {
                        return Err(ConvertError::InvalidTemplate(format!(
                            "placeholder at byte {pos} refers to field {index}, only {FIELD_COUNT} are available"
                        )));
                    }

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(index));
                }
                '}' if chars.peek().map(|(_, c)| *c) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(ConvertError::InvalidTemplate(format!(
                        "single '}}' at byte {pos}; use '}}}}' for a literal brace"
                    )));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConvertError::TemplateLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// The C header template shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_TEMPLATE)
    }

    /// Number of placeholders in the template.
    pub fn field_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Field(_)))
            .count()
    }

    pub fn render(&self, fields: &[String; FIELD_COUNT]) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(index) => out.push_str(&fields[*index]),
            }
        }
        out
    }
}

/// Where a run's template comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemplateSource {
    #[default]
    Builtin,
    File(PathBuf),
    Inline(String),
}

impl TemplateSource {
    pub fn load(&self) -> Result<Template> {
        match self {
            TemplateSource::Builtin => Template::builtin(),
            TemplateSource::File(path) => Template::load(path),
            TemplateSource::Inline(text) => Template::parse(text),
        }
    }
}

/// Values substituted into the template besides the frame array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub mode: PackingMode,
    /// The logical width when rotated; the full page width otherwise.
    pub active_bit_width: u32,
    pub height: u32,
    pub target_fps: u32,
    pub frame_count: usize,
    pub x_offset: i64,
}

impl AssetMetadata {
    pub fn fields(&self, frames: &str) -> [String; FIELD_COUNT] {
        [
            self.mode.label().to_string(),
            self.active_bit_width.to_string(),
            self.height.to_string(),
            self.target_fps.to_string(),
            self.frame_count.to_string(),
            self.x_offset.to_string(),
            self.mode.stride_keyword().to_string(),
            frames.to_string(),
        ]
    }
}

/// Collects packed frames into one literal array.
#[derive(Debug, Clone)]
pub struct OutputAssembler {
    profile: HardwareProfile,
    mode: PackingMode,
    width: u32,
    height: u32,
    target_fps: u32,
    words_per_frame: usize,
    frames: String,
    frame_count: usize,
}

impl OutputAssembler {
    pub fn new(config: &ConversionConfig, profile: HardwareProfile) -> Self {
        let mode = config.packing_mode(&profile);
        Self {
            profile,
            mode,
            width: config.output_width,
            height: config.output_height,
            target_fps: config.target_frame_rate,
            words_per_frame: mode.words_per_frame(config.output_width, config.output_height),
            frames: String::new(),
            frame_count: 0,
        }
    }

    pub fn mode(&self) -> PackingMode {
        self.mode
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// The frame array text accumulated so far.
    pub fn frames_text(&self) -> &str {
        &self.frames
    }

    /// Appends one frame. Every frame must share the run's layout.
    pub fn push(&mut self, frame: &PackedFrame) -> Result<()> {
        if frame.mode() != self.mode || frame.len() != self.words_per_frame {
            return Err(ConvertError::MismatchedFrame {
                expected: self.mode,
                expected_words: self.words_per_frame,
                found: frame.mode(),
                found_words: frame.len(),
            });
        }
        if self.frame_count > 0 {
            self.frames.push_str(",\n");
        }
        self.frames.push_str(&frame.to_literal());
        self.frame_count += 1;
        Ok(())
    }

    pub fn metadata(&self) -> AssetMetadata {
        let active_bit_width = match self.mode {
            PackingMode::ColumnMajor64Rotated => self.width,
            PackingMode::RowMajor64 => self.profile.page_bits,
        };
        AssetMetadata {
            mode: self.mode,
            active_bit_width,
            height: self.height,
            target_fps: self.target_fps,
            frame_count: self.frame_count,
            x_offset: self.profile.centering_offset(self.width),
        }
    }

    /// Substitutes the metadata and frame array into `template`.
    pub fn render(&self, template: &Template) -> String {
        template.render(&self.metadata().fields(&self.frames))
    }
}

/// A temporary file removed on drop unless it is persisted.
pub struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the file to `dest`, keeping it.
    pub fn persist(mut self, dest: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Writes `text` to `path` through a sibling temporary file so a failed
/// write never leaves a truncated asset behind.
pub fn write_asset(path: &Path, text: &str) -> Result<()> {
    let write_err = |source| ConvertError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(ConvertError::MissingOutputPath)?;
    let guard = TempFileGuard::new(path.with_file_name(format!(".{file_name}.tmp")));

    debug!("writing {} bytes to {}", text.len(), guard.path().display());
    fs::write(guard.path(), text).map_err(write_err)?;
    guard.persist(path).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::pack;
    use crate::raster::BinaryRaster;

    fn fields() -> [String; FIELD_COUNT] {
        ["a", "b", "c", "d", "e", "f", "g", "h"].map(String::from)
    }

    #[test]
    fn test_template_auto_fields_and_escapes() {
        let template = Template::parse("{} {{x}} {}{}|{}{}{}{}{}").unwrap();
        assert_eq!(template.field_count(), 8);
        assert_eq!(template.render(&fields()), "a {x} bc|defgh");
    }

    #[test]
    fn test_template_explicit_fields() {
        let template = Template::parse("{7}-{0}-{7}").unwrap();
        assert_eq!(template.render(&fields()), "h-a-h");
    }

    #[test]
    fn test_template_errors() {
        assert!(matches!(Template::parse("{}{1}"), Err(ConvertError::InvalidTemplate(_))));
        assert!(matches!(Template::parse("{8}"), Err(ConvertError::InvalidTemplate(_))));
        assert!(matches!(Template::parse("{}{}{}{}{}{}{}{}{}"), Err(ConvertError::InvalidTemplate(_))));
        assert!(matches!(Template::parse("{ "), Err(ConvertError::InvalidTemplate(_))));
        assert!(matches!(Template::parse("a } b"), Err(ConvertError::InvalidTemplate(_))));
        assert!(matches!(Template::parse("{:x}"), Err(ConvertError::InvalidTemplate(_))));
    }

    #[test]
    fn test_format_spec_is_named_in_error() {
        for text in ["{0:x}", "{:>8}", "{3!r}"] {
            match Template::parse(text) {
                Err(ConvertError::InvalidTemplate(message)) => {
                    assert!(message.starts_with("format specs are not supported"), "{message}");
                    assert!(message.contains(text), "{message}");
                }
                other => panic!("{text} parsed as {:?}", other.map(|t| t.field_count())),
            }
        }
    }

    #[test]
    fn test_builtin_template_uses_all_fields() {
        let template = Template::builtin().unwrap();
        assert_eq!(template.field_count(), FIELD_COUNT);
        let text = template.render(&fields());
        assert!(text.contains("#define a"));
        assert!(text.contains("movie_data[MOVIE_FRAMES][g] = {\nh\n};"));
    }

    #[test]
    fn test_missing_template_file() {
        let err = Template::load(Path::new("/nonexistent/template.txt")).unwrap_err();
        assert!(matches!(err, ConvertError::TemplateLoad { .. }));
    }

    #[test]
    fn test_frames_joined_without_trailing_separator() {
        let config = ConversionConfig::default().with_size(4, 2).with_frame_rates(30, 15);
        let mut assembler = OutputAssembler::new(&config, HardwareProfile::default());
        let lit = pack(&BinaryRaster::from_fn(4, 2, |_, _| true), PackingMode::RowMajor64);
        let dark = pack(&BinaryRaster::from_fn(4, 2, |_, _| false), PackingMode::RowMajor64);
        assembler.push(&lit).unwrap();
        assembler.push(&dark).unwrap();

        assert_eq!(assembler.frames_text(), "  {0xf,0xf},\n  {0x0,0x0}");
        assert_eq!(assembler.frame_count(), 2);
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let config = ConversionConfig::default().with_size(4, 2);
        let mut assembler = OutputAssembler::new(&config, HardwareProfile::default());
        let wrong = pack(&BinaryRaster::from_fn(4, 3, |_, _| true), PackingMode::RowMajor64);
        assert!(matches!(
            assembler.push(&wrong),
            Err(ConvertError::MismatchedFrame { expected_words: 2, found_words: 3, .. })
        ));
        assert_eq!(assembler.frame_count(), 0);
    }

    #[test]
    fn test_metadata_row_major() {
        let config = ConversionConfig::default().with_size(64, 48).with_frame_rates(30, 15);
        let assembler = OutputAssembler::new(&config, HardwareProfile::default());
        let meta = assembler.metadata();
        assert_eq!(meta.mode, PackingMode::RowMajor64);
        assert_eq!(meta.active_bit_width, 64);
        assert_eq!(meta.x_offset, 33);
        assert_eq!(meta.target_fps, 15);
        let fields = meta.fields("");
        assert_eq!(fields[0], "MODE_64BIT");
        assert_eq!(fields[6], "MOVIE_HEIGHT");
    }

    #[test]
    fn test_metadata_rotated() {
        let config = ConversionConfig::default().with_size(114, 64);
        let assembler = OutputAssembler::new(&config, HardwareProfile::default());
        let meta = assembler.metadata();
        assert_eq!(meta.mode, PackingMode::ColumnMajor64Rotated);
        assert_eq!(meta.active_bit_width, 114);
        assert_eq!(meta.x_offset, 8);
        let fields = meta.fields("");
        assert_eq!(fields[0], "MODE_64BIT_ROT");
        assert_eq!(fields[6], "MOVIE_WIDTH");
    }

    #[test]
    fn test_write_asset_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("MovieData.h");
        write_asset(&path, "hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_asset_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("MovieData.h");
        assert!(matches!(write_asset(&path, "x"), Err(ConvertError::OutputWrite { .. })));
        assert!(!path.exists());
    }
}
