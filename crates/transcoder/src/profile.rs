//! Transcoder argument profiles.
//!
//! Every invocation starts with the same global options and input section;
//! the profile decides the output section.

use std::fmt;
use std::path::Path;

/// Extension of the still images written by the capture profile.
pub const FRAME_EXTENSION: &str = "jpg";

/// Output pattern handed to the image2 muxer (8-digit, 1-based index).
pub const FRAME_PATTERN: &str = "frame_%08d.jpg";

/// Index of the first frame the image2 muxer writes.
pub const FIRST_FRAME_INDEX: u64 = 1;

/// URL schemes that carry a live stream and need reliable (TCP) transport.
const STREAMED_SCHEMES: &[&str] = &["rtsp", "rtsps"];

/// Which lifecycle an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    Relay,
    Capture,
    Forward,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relay => "relay",
            Self::Capture => "capture",
            Self::Forward => "forward",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding parameters of the relay profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Video bitrate, in transcoder notation (e.g. `1000k`).
    pub bitrate: String,
    /// Fixed output frame rate.
    pub fps: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bitrate: "1000k".to_string(),
            fps: 25,
        }
    }
}

/// A fully resolved transcoder argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub kind: ProfileKind,
    pub args: Vec<String>,
}

impl Invocation {
    /// Low-latency MPEG-TS/MPEG-1 encode to stdout for viewer fan-out.
    pub fn relay(source: &str, settings: &RelaySettings) -> Self {
        let mut args = input_args(source);
        args.extend(
            [
                "-f",
                "mpegts",
                "-codec:v",
                "mpeg1video",
                "-b:v",
                settings.bitrate.as_str(),
                "-bf",
                "0",
            ]
            .map(String::from),
        );
        args.push("-r".to_string());
        args.push(settings.fps.to_string());
        args.push("-".to_string());
        Self {
            kind: ProfileKind::Relay,
            args,
        }
    }

    /// Sequential still images in `dir`, optionally resampled to `fps`.
    pub fn capture(source: &str, dir: &Path, fps: Option<u32>) -> Self {
        let mut args = input_args(source);
        args.push("-f".to_string());
        args.push("image2".to_string());
        if let Some(fps) = fps.filter(|fps| *fps > 0) {
            args.push("-vf".to_string());
            args.push(format!("fps={fps}"));
        }
        args.push(dir.join(FRAME_PATTERN).to_string_lossy().into_owned());
        Self {
            kind: ProfileKind::Capture,
            args,
        }
    }

    /// Stream copy into MPEG-TS over TCP to `host:port`.
    pub fn forward(source: &str, host: &str, port: u16) -> Self {
        let mut args = input_args(source);
        args.extend(["-c", "copy", "-f", "mpegts"].map(String::from));
        args.push(format!("tcp://{host}:{port}"));
        Self {
            kind: ProfileKind::Forward,
            args,
        }
    }

    /// Printable command line, for logs and the CLI.
    pub fn command_line(&self, program: &Path) -> String {
        std::iter::once(program.display().to_string())
            .chain(self.args.iter().map(|arg| {
                if arg.contains(' ') {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Whether the source URL names a streamed transport.
pub fn is_streamed_source(source: &str) -> bool {
    source
        .split_once("://")
        .map(|(scheme, _)| {
            STREAMED_SCHEMES
                .iter()
                .any(|s| scheme.eq_ignore_ascii_case(s))
        })
        .unwrap_or(false)
}

fn input_args(source: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning"]
        .map(String::from)
        .to_vec();
    if is_streamed_source(source) {
        args.push("-rtsp_transport".to_string());
        args.push("tcp".to_string());
    }
    args.push("-i".to_string());
    args.push(source.to_string());
    args
}

/// File name of the capture frame with the given index.
pub fn frame_file_name(index: u64) -> String {
    format!("frame_{index:08}.{FRAME_EXTENSION}")
}

/// Index of a capture frame file name (`frame_00000042.jpg` → 42).
pub fn frame_index(name: &str) -> Option<u64> {
    let digits = name
        .strip_prefix("frame_")?
        .strip_suffix(FRAME_EXTENSION)?
        .strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Whether a path has the frame image extension.
pub fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(FRAME_EXTENSION))
        .unwrap_or(false)
}
