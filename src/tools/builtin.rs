// src/tools/builtin.rs

//! Built-in tool implementations: ffmpeg, ImageMagick, LibreOffice

use super::runner::{self, ToolRun};
use super::{ConversionRequest, ExternalTool, ProbeOutput};
use crate::error::Result;
use crate::record::MediaInfo;
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

fn split_args(args: &str) -> impl Iterator<Item = OsString> + '_ {
    args.split_whitespace().map(OsString::from)
}

/// Parse a tool's JSON stdout into a metadata snapshot
fn media_info(tool: &str, run: &ToolRun) -> Option<MediaInfo> {
    if !run.success {
        return None;
    }
    match serde_json::from_str(&run.stdout) {
        Ok(data) => Some(MediaInfo {
            tool: tool.to_string(),
            data,
        }),
        Err(e) => {
            debug!("{} produced unparsable metadata: {}", tool, e);
            None
        }
    }
}

/// Audio/video decoding check and transcoding
#[derive(Debug, Clone, Default)]
pub struct Ffmpeg {
    timeout: Option<Duration>,
}

impl Ffmpeg {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ExternalTool for Ffmpeg {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn binaries(&self) -> Vec<&str> {
        vec!["ffmpeg", "ffprobe"]
    }

    fn probe(&self, path: &Path) -> Result<Option<ProbeOutput>> {
        // Full decode to the null muxer surfaces stream corruption
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-i".into(),
            path.as_os_str().to_owned(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ];
        let decode = runner::run("ffmpeg", &args, self.timeout)?;

        let args: Vec<OsString> = vec![
            "-v".into(),
            "quiet".into(),
            "-print_format".into(),
            "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            path.as_os_str().to_owned(),
        ];
        let info = runner::run("ffprobe", &args, self.timeout)?;

        Ok(Some(ProbeOutput {
            diagnostics: decode.stderr.trim().to_string(),
            media_info: media_info("ffprobe", &info),
        }))
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ToolRun> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-nostdin".into(),
            "-i".into(),
            request.input.as_os_str().to_owned(),
        ];
        args.extend(split_args(request.args));
        args.push(request.output.as_os_str().to_owned());
        runner::run("ffmpeg", &args, self.timeout)
    }
}

/// Raster image checks and conversion
#[derive(Debug, Clone, Default)]
pub struct ImageMagick {
    timeout: Option<Duration>,
}

impl ImageMagick {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ExternalTool for ImageMagick {
    fn name(&self) -> &str {
        "magick"
    }

    fn probe(&self, path: &Path) -> Result<Option<ProbeOutput>> {
        let args: Vec<OsString> = vec![
            "identify".into(),
            "-regard-warnings".into(),
            path.as_os_str().to_owned(),
        ];
        let check = runner::run("magick", &args, self.timeout)?;

        let mut json_target = path.as_os_str().to_owned();
        json_target.push("[0]");
        let args: Vec<OsString> = vec![json_target, "json:".into()];
        let info = runner::run("magick", &args, self.timeout)?;

        Ok(Some(ProbeOutput {
            diagnostics: check.stderr.trim().to_string(),
            media_info: media_info("magick", &info),
        }))
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ToolRun> {
        let mut args: Vec<OsString> = vec![request.input.as_os_str().to_owned()];
        args.extend(split_args(request.args));
        args.push(request.output.as_os_str().to_owned());
        runner::run("magick", &args, self.timeout)
    }
}

/// Office document conversion through a headless LibreOffice
///
/// LibreOffice has no useful integrity check, so it never probes.
#[derive(Debug, Clone, Default)]
pub struct LibreOffice {
    timeout: Option<Duration>,
}

impl LibreOffice {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ExternalTool for LibreOffice {
    fn name(&self) -> &str {
        "soffice"
    }

    fn probe(&self, _path: &Path) -> Result<Option<ProbeOutput>> {
        Ok(None)
    }

    fn convert(&self, request: &ConversionRequest<'_>) -> Result<ToolRun> {
        // The filter name is one argument and may contain spaces
        let convert_to = if request.args.trim().is_empty() {
            request.target_container.to_string()
        } else {
            format!("{}:{}", request.target_container, request.args.trim())
        };
        let args: Vec<OsString> = vec![
            "--headless".into(),
            "--convert-to".into(),
            convert_to.into(),
            "--outdir".into(),
            request.scratch_dir.as_os_str().to_owned(),
            request.input.as_os_str().to_owned(),
        ];
        runner::run("soffice", &args, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_args() {
        let args: Vec<OsString> = split_args("  -c:v libx264   -crf 18 ").collect();
        let expected: Vec<OsString> = ["-c:v", "libx264", "-crf", "18"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_media_info_requires_success_and_json() {
        let ok = ToolRun {
            stdout: r#"{"streams": []}"#.to_string(),
            success: true,
            ..Default::default()
        };
        assert_eq!(media_info("ffprobe", &ok).unwrap().tool, "ffprobe");

        let failed = ToolRun {
            success: false,
            ..ok.clone()
        };
        assert!(media_info("ffprobe", &failed).is_none());

        let garbage = ToolRun {
            stdout: "not json".to_string(),
            success: true,
            ..Default::default()
        };
        assert!(media_info("ffprobe", &garbage).is_none());
    }

    #[test]
    fn test_libreoffice_never_probes() {
        let tool = LibreOffice::new(None);
        assert!(tool.probe(Path::new("/nonexistent.doc")).unwrap().is_none());
    }
}
