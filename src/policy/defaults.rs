// src/policy/defaults.rs

//! Built-in format table
//!
//! One row per format id: display name, canonical extensions, and the rule
//! that `policy generate` proposes for it. Formats missing here get a blank
//! rule (or none at all in strict mode).

use super::{CodecRequirement, PolicyRule};

/// Shared ffmpeg arguments for the H.264/AAC MP4 target
const MP4_ARGS: &str = "-c:v libx264 -crf 18 -pix_fmt yuv420p -c:a aac -b:a 192k";

/// Row of the built-in table
#[derive(Debug, Clone, Copy)]
pub struct BuiltinFormat {
    pub id: &'static str,
    pub name: &'static str,
    pub extensions: &'static [&'static str],
    pub bin: &'static str,
    pub accepted: bool,
    pub target_container: Option<&'static str>,
    pub processing_args: &'static str,
    pub expected: &'static [&'static str],
    /// Required (video, audio) codec pair
    pub codecs: Option<(&'static str, &'static str)>,
}

const fn keep(
    id: &'static str,
    name: &'static str,
    extensions: &'static [&'static str],
    bin: &'static str,
) -> BuiltinFormat {
    BuiltinFormat {
        id,
        name,
        extensions,
        bin,
        accepted: true,
        target_container: None,
        processing_args: "",
        expected: &[],
        codecs: None,
    }
}

const fn convert(
    id: &'static str,
    name: &'static str,
    extensions: &'static [&'static str],
    bin: &'static str,
    target: &'static str,
    args: &'static str,
    expected: &'static [&'static str],
) -> BuiltinFormat {
    BuiltinFormat {
        id,
        name,
        extensions,
        bin,
        accepted: false,
        target_container: Some(target),
        processing_args: args,
        expected,
        codecs: None,
    }
}

pub static BUILTIN_FORMATS: &[BuiltinFormat] = &[
    // Documents
    keep("fmt/18", "Acrobat PDF 1.4 - Portable Document Format", &["pdf"], ""),
    keep("fmt/19", "Acrobat PDF 1.5 - Portable Document Format", &["pdf"], ""),
    keep("fmt/20", "Acrobat PDF 1.6 - Portable Document Format", &["pdf"], ""),
    keep("fmt/276", "Acrobat PDF 1.7 - Portable Document Format", &["pdf"], ""),
    keep("fmt/95", "Acrobat PDF/A - Portable Document Format 1a", &["pdf"], ""),
    keep("fmt/354", "Acrobat PDF/A - Portable Document Format 1b", &["pdf"], ""),
    keep("fmt/476", "Acrobat PDF/A - Portable Document Format 2a", &["pdf"], ""),
    keep("fmt/477", "Acrobat PDF/A - Portable Document Format 2b", &["pdf"], ""),
    keep("fmt/478", "Acrobat PDF/A - Portable Document Format 2u", &["pdf"], ""),
    keep("x-fmt/111", "Plain Text File", &["txt", "text"], ""),
    keep("x-fmt/18", "Comma Separated Values", &["csv"], ""),
    keep("fmt/101", "Extensible Markup Language", &["xml"], ""),
    keep("fmt/96", "Hypertext Markup Language", &["html", "htm"], ""),
    keep("fmt/412", "Microsoft Word for Windows 2007 onwards", &["docx"], ""),
    keep("fmt/214", "Microsoft Excel for Windows 2007 onwards", &["xlsx"], ""),
    keep("fmt/215", "Microsoft Powerpoint for Windows 2007 onwards", &["pptx"], ""),
    keep("fmt/290", "OpenDocument Text 1.0", &["odt"], ""),
    keep("fmt/291", "OpenDocument Text 1.1", &["odt"], ""),
    convert(
        "fmt/40",
        "Microsoft Word Document 97-2003",
        &["doc"],
        "soffice",
        "docx",
        "MS Word 2007 XML",
        &["fmt/412"],
    ),
    convert(
        "fmt/61",
        "Microsoft Excel 97 Workbook",
        &["xls"],
        "soffice",
        "xlsx",
        "Calc MS Excel 2007 XML",
        &["fmt/214"],
    ),
    convert(
        "fmt/126",
        "Microsoft Powerpoint Presentation 97-2003",
        &["ppt"],
        "soffice",
        "pptx",
        "Impress MS PowerPoint 2007 XML",
        &["fmt/215"],
    ),
    // Raster images
    keep("fmt/353", "Tagged Image File Format", &["tif", "tiff"], "magick"),
    keep("fmt/11", "Portable Network Graphics 1.0", &["png"], "magick"),
    keep("fmt/12", "Portable Network Graphics 1.1", &["png"], "magick"),
    keep("fmt/13", "Portable Network Graphics 1.2", &["png"], "magick"),
    keep("fmt/43", "JPEG File Interchange Format 1.01", &["jpg", "jpeg", "jpe"], "magick"),
    keep("fmt/44", "JPEG File Interchange Format 1.02", &["jpg", "jpeg", "jpe"], "magick"),
    convert(
        "fmt/3",
        "Graphics Interchange Format 87a",
        &["gif"],
        "magick",
        "tif",
        "-compress lzw",
        &["fmt/353"],
    ),
    convert(
        "fmt/4",
        "Graphics Interchange Format 89a",
        &["gif"],
        "magick",
        "tif",
        "-compress lzw",
        &["fmt/353"],
    ),
    convert(
        "fmt/116",
        "Windows Bitmap 3.0",
        &["bmp"],
        "magick",
        "tif",
        "-compress lzw",
        &["fmt/353"],
    ),
    convert(
        "fmt/119",
        "Windows Bitmap 4.0",
        &["bmp"],
        "magick",
        "tif",
        "-compress lzw",
        &["fmt/353"],
    ),
    // Audio
    keep("fmt/134", "MPEG 1/2 Audio Layer 3", &["mp3"], "ffmpeg"),
    keep("fmt/141", "Waveform Audio (PCMWAVEFORMAT)", &["wav"], "ffmpeg"),
    keep("fmt/279", "FLAC (Free Lossless Audio Codec)", &["flac"], "ffmpeg"),
    // Video
    BuiltinFormat {
        id: "fmt/199",
        name: "MPEG-4 Media File",
        extensions: &["mp4", "m4v", "m4a", "f4v"],
        bin: "ffmpeg",
        accepted: true,
        target_container: Some("mp4"),
        processing_args: MP4_ARGS,
        expected: &["fmt/199"],
        codecs: Some(("h264", "aac")),
    },
    convert(
        "fmt/5",
        "Audio/Video Interleaved Format",
        &["avi"],
        "ffmpeg",
        "mp4",
        MP4_ARGS,
        &["fmt/199"],
    ),
    convert(
        "x-fmt/384",
        "Quicktime",
        &["mov", "qt"],
        "ffmpeg",
        "mp4",
        MP4_ARGS,
        &["fmt/199"],
    ),
];

/// Look up a row of the built-in table
pub fn builtin(id: &str) -> Option<&'static BuiltinFormat> {
    BUILTIN_FORMATS.iter().find(|f| f.id == id)
}

impl BuiltinFormat {
    /// Materialize the row as a policy rule
    ///
    /// `keep_original` decides the disposition of converted originals.
    pub fn to_rule(&self, keep_original: bool) -> PolicyRule {
        let converts = !self.accepted || self.codecs.is_some();
        PolicyRule {
            format_name: self.name.to_string(),
            bin: self.bin.to_string(),
            accepted: self.accepted,
            target_container: self.target_container.map(str::to_string),
            processing_args: converts.then(|| self.processing_args.to_string()),
            expected: converts.then(|| self.expected.iter().map(|s| s.to_string()).collect()),
            remove_original: converts.then_some(!keep_original),
            force_log: false,
            codecs: self.codecs.map(|(video, audio)| CodecRequirement {
                video: Some(video.to_string()),
                audio: Some(audio.to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique() {
        let mut seen = HashSet::new();
        for f in BUILTIN_FORMATS {
            assert!(seen.insert(f.id), "duplicate builtin id {}", f.id);
        }
    }

    #[test]
    fn test_conversions_declare_targets() {
        for f in BUILTIN_FORMATS.iter().filter(|f| !f.accepted) {
            assert!(f.target_container.is_some(), "{} lacks a target", f.id);
            assert!(!f.expected.is_empty(), "{} lacks expected formats", f.id);
            assert!(!f.processing_args.contains(';'));
        }
    }

    #[test]
    fn test_to_rule_disposition() {
        let gif = builtin("fmt/4").unwrap();
        assert_eq!(gif.to_rule(true).remove_original, Some(false));
        assert_eq!(gif.to_rule(false).remove_original, Some(true));

        let pdf = builtin("fmt/18").unwrap().to_rule(false);
        assert!(pdf.accepted);
        assert!(pdf.remove_original.is_none());
        assert!(pdf.target_container.is_none());
    }
}
