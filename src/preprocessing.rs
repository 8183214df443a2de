use crate::error::{ConvertError, Result};

#[derive(Debug, Clone, Copy)]
pub struct PreprocessPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub filter: &'static str,
}

pub const PREPROCESS_PRESETS: &[PreprocessPreset] = &[
    PreprocessPreset {
        name: "contours",
        description: "Edge detection with strong contrast; draws outlines instead of filled shapes.",
        filter: "format=gray,edgedetect=mode=colormix:high=0.2:low=0.05,eq=contrast=2.5:brightness=-0.1",
    },
    PreprocessPreset {
        name: "contours-soft",
        description: "Softer outline extraction with fewer stray edges.",
        filter: "format=gray,edgedetect=mode=colormix:high=0.12:low=0.03,eq=contrast=2.0:brightness=-0.05",
    },
    PreprocessPreset {
        name: "bw-contrast",
        description: "Grayscale with a contrast boost so the threshold splits cleanly.",
        filter: "format=gray,eq=contrast=2.2:brightness=-0.08",
    },
    PreprocessPreset {
        name: "noir-detail",
        description: "Sharpened grayscale that keeps texture after thresholding.",
        filter: "format=gray,unsharp=5:5:1.0:5:5:0.0,eq=contrast=1.8:brightness=-0.04",
    },
    PreprocessPreset {
        name: "negate",
        description: "Inverts the picture before thresholding (dark scenes on a lit display).",
        filter: "negate",
    },
];

pub fn find_preprocess_preset(name: &str) -> Option<&'static PreprocessPreset> {
    PREPROCESS_PRESETS.iter().find(|preset| preset.name.eq_ignore_ascii_case(name))
}

/// Picks the decoder filter chain: an explicit filter wins over a preset name.
pub fn resolve_preprocess_filter(preprocess: Option<&str>, preprocess_preset: Option<&str>) -> Result<Option<String>> {
    if let Some(filter) = preprocess {
        let filter = filter.trim();
        if filter.is_empty() {
            return Err(ConvertError::Config("--preprocess cannot be empty".into()));
        }
        return Ok(Some(filter.to_string()));
    }

    if let Some(name) = preprocess_preset {
        let preset = find_preprocess_preset(name.trim()).ok_or_else(|| {
            let available = PREPROCESS_PRESETS.iter().map(|p| p.name).collect::<Vec<_>>().join(", ");
            ConvertError::Config(format!("Unknown preprocessing preset '{}'. Available presets: {}", name, available))
        })?;
        return Ok(Some(preset.filter.to_string()));
    }

    Ok(None)
}

/// Builds the `-vf` argument for the decoder, or `None` when frames pass
/// through untouched. A user filter is followed by a scale back to the probed
/// size so every frame keeps the byte length the reader expects.
pub(crate) fn build_decode_vf(preprocess_filter: Option<&str>, width: u32, height: u32) -> Option<String> {
    preprocess_filter
        .map(str::trim)
        .map(|s| s.trim_end_matches(','))
        .filter(|s| !s.is_empty())
        .map(|filter| format!("{},scale={}:{}", filter, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter_wins() {
        let filter = resolve_preprocess_filter(Some(" hflip "), Some("contours")).unwrap();
        assert_eq!(filter.as_deref(), Some("hflip"));
    }

    #[test]
    fn test_preset_lookup_ignores_case() {
        let filter = resolve_preprocess_filter(None, Some("NEGATE")).unwrap();
        assert_eq!(filter.as_deref(), Some("negate"));
    }

    #[test]
    fn test_unknown_preset_lists_available() {
        let err = resolve_preprocess_filter(None, Some("sepia")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("sepia"));
        assert!(message.contains("contours"));
    }

    #[test]
    fn test_empty_filter_rejected() {
        assert!(resolve_preprocess_filter(Some("  "), None).is_err());
    }

    #[test]
    fn test_decode_vf() {
        assert_eq!(build_decode_vf(None, 640, 360), None);
        assert_eq!(build_decode_vf(Some(" , "), 640, 360), None);
        assert_eq!(
            build_decode_vf(Some("negate,"), 640, 360).as_deref(),
            Some("negate,scale=640:360")
        );
    }
}
