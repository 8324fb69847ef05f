//! ffmpeg command construction
//!
//! Each profile is an argument template producing MPEG-TS on stdout. The
//! `{streamUrl}` placeholder is replaced with the source URL. When no profile
//! is configured, one is picked from the hardware found on the host.

use std::path::Path;

use crate::error::{Error, Result};

/// Placeholder substituted with the upstream URL
pub const URL_PLACEHOLDER: &str = "{streamUrl}";

/// Default program name for the transcoder
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

const NVIDIA_DEVICE: &str = "/dev/nvidia0";
const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Built-in encoder profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// NVIDIA HEVC encoder
    HevcNvenc,
    /// NVIDIA H.264 encoder
    H264Nvenc,
    /// Intel Quick Sync H.264 encoder
    H264Qsv,
    /// CPU x264 encoder
    SoftwareLibx264,
}

impl Profile {
    /// All built-in profiles
    pub const ALL: [Profile; 4] = [
        Profile::HevcNvenc,
        Profile::H264Nvenc,
        Profile::H264Qsv,
        Profile::SoftwareLibx264,
    ];

    /// Configuration name of the profile
    pub fn name(&self) -> &'static str {
        match self {
            Profile::HevcNvenc => "hevc_nvenc",
            Profile::H264Nvenc => "h264_nvenc",
            Profile::H264Qsv => "h264_qsv",
            Profile::SoftwareLibx264 => "software_libx264",
        }
    }

    /// Look up a profile by its configuration name
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    /// Pick a profile from the devices present on this host
    pub fn detect() -> Self {
        Self::detect_with(|p| Path::new(p).exists())
    }

    fn detect_with(device_exists: impl Fn(&str) -> bool) -> Self {
        if device_exists(NVIDIA_DEVICE) {
            Profile::HevcNvenc
        } else if device_exists(VAAPI_DEVICE) {
            Profile::H264Qsv
        } else {
            Profile::SoftwareLibx264
        }
    }

    /// Arguments after the program name, with the URL placeholder still in place
    #[rustfmt::skip]
    fn template(&self) -> &'static [&'static str] {
        match self {
            Profile::HevcNvenc => &[
                "-hide_banner", "-loglevel", "error",
                "-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "60",
                "-fflags", "+genpts+discardcorrupt", "-flags", "low_delay",
                "-i", URL_PLACEHOLDER,
                "-map", "0:v:0", "-map", "0:a:0?",
                "-c:v", "hevc_nvenc", "-preset", "fast", "-tune", "ull",
                "-profile:v", "main", "-level", "4.1",
                "-rc", "vbr_hq", "-cq", "26",
                "-b:v", "6000k", "-maxrate", "7500k", "-bufsize", "12000k",
                "-c:a", "aac", "-b:a", "128k", "-ac", "2",
                "-f", "mpegts", "-mpegts_flags", "+initial_discontinuity",
                "pipe:1",
            ],
            Profile::H264Nvenc => &[
                "-hide_banner", "-loglevel", "error",
                "-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "60",
                "-fflags", "+genpts+discardcorrupt", "-flags", "low_delay",
                "-i", URL_PLACEHOLDER,
                "-map", "0:v:0", "-map", "0:a:0?",
                "-c:v", "h264_nvenc", "-preset", "fast", "-tune", "ull",
                "-profile:v", "main", "-level", "4.1",
                "-rc", "vbr_hq", "-cq", "23",
                "-b:v", "10000k", "-maxrate", "13000k", "-bufsize", "26000k",
                "-c:a", "aac", "-b:a", "128k", "-ac", "2",
                "-f", "mpegts", "-mpegts_flags", "+initial_discontinuity",
                "pipe:1",
            ],
            Profile::H264Qsv => &[
                "-hide_banner", "-loglevel", "error",
                "-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "60",
                "-fflags", "+genpts+discardcorrupt", "-flags", "low_delay",
                "-i", URL_PLACEHOLDER,
                "-map", "0:v:0", "-map", "0:a:0?",
                "-c:v", "h264_qsv", "-preset", "fast", "-global_quality", "23",
                "-profile:v", "main", "-level", "4.1",
                "-b:v", "8000k", "-maxrate", "10000k", "-bufsize", "20000k",
                "-c:a", "aac", "-b:a", "128k", "-ac", "2",
                "-f", "mpegts", "-mpegts_flags", "+initial_discontinuity",
                "pipe:1",
            ],
            Profile::SoftwareLibx264 => &[
                "-hide_banner", "-loglevel", "info",
                "-reconnect", "1", "-reconnect_streamed", "1", "-reconnect_delay_max", "4294",
                "-i", URL_PLACEHOLDER,
                "-map", "0:0", "-map", "0:1?",
                "-c:v", "libx264", "-preset", "fast", "-crf", "23",
                "-maxrate", "8000000", "-bufsize", "16000000",
                "-profile:v", "main", "-level", "4.1",
                "-force_key_frames", "expr:gte(t,n_forced*3)",
                "-c:a", "aac", "-ac", "2", "-b:a", "192k",
                "-f", "mpegts",
                "pipe:1",
            ],
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves a source URL into the full command line of its producer
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: String,
    args: Vec<String>,
}

impl CommandBuilder {
    /// Builder for a built-in profile
    pub fn new(binary: impl Into<String>, profile: Profile) -> Self {
        Self {
            program: binary.into(),
            args: profile.template().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builder for the configured profile name, or the detected one if blank
    pub fn from_config(binary: impl Into<String>, profile_name: Option<&str>) -> Result<Self> {
        let profile = match profile_name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => Profile::from_name(name)?,
            None => Profile::detect(),
        };

        Ok(Self::new(binary, profile))
    }

    /// Builder for an arbitrary program and argument template
    pub fn custom(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Program that will be executed
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for `url`, placeholder substituted
    pub fn build(&self, url: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names_round_trip() {
        for profile in Profile::ALL {
            assert_eq!(Profile::from_name(profile.name()).unwrap(), profile);
        }
    }

    #[test]
    fn test_unknown_profile() {
        let result = Profile::from_name("vp9_magic");
        assert!(matches!(result, Err(Error::UnknownProfile(name)) if name == "vp9_magic"));
    }

    #[test]
    fn test_detect_prefers_nvidia() {
        let profile = Profile::detect_with(|_| true);
        assert_eq!(profile, Profile::HevcNvenc);
    }

    #[test]
    fn test_detect_render_node() {
        let profile = Profile::detect_with(|p| p == VAAPI_DEVICE);
        assert_eq!(profile, Profile::H264Qsv);
    }

    #[test]
    fn test_detect_falls_back_to_software() {
        let profile = Profile::detect_with(|_| false);
        assert_eq!(profile, Profile::SoftwareLibx264);
    }

    #[test]
    fn test_build_substitutes_url() {
        let builder = CommandBuilder::new("ffmpeg", Profile::SoftwareLibx264);
        let args = builder.build("http://example.com/a.m3u8");

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "http://example.com/a.m3u8");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
        assert!(!args.iter().any(|a| a.contains(URL_PLACEHOLDER)));
    }

    #[test]
    fn test_every_profile_outputs_mpegts() {
        for profile in Profile::ALL {
            let args = CommandBuilder::new("ffmpeg", profile).build("x");
            let format = args.iter().position(|a| a == "-f").unwrap();
            assert_eq!(args[format + 1], "mpegts", "profile {}", profile);
        }
    }

    #[test]
    fn test_from_config_blank_name_detects() {
        let builder = CommandBuilder::from_config("ffmpeg", Some("   ")).unwrap();
        assert_eq!(builder.program(), "ffmpeg");
    }

    #[test]
    fn test_from_config_named_profile() {
        let builder = CommandBuilder::from_config("/usr/bin/ffmpeg", Some(" h264_nvenc ")).unwrap();
        let args = builder.build("x");

        assert_eq!(builder.program(), "/usr/bin/ffmpeg");
        assert!(args.iter().any(|a| a == "h264_nvenc"));
    }

    #[test]
    fn test_from_config_unknown_name() {
        assert!(CommandBuilder::from_config("ffmpeg", Some("bogus")).is_err());
    }
}
