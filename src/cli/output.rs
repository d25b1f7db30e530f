#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

impl OutputOptions {
    /// Resolve the global CLI flags into concrete output options.
    pub fn resolve(
        format: Option<&str>,
        json: bool,
        pretty: bool,
        no_color: bool,
        verbose: bool,
    ) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            match format {
                Some("json") => OutputFormat::Json,
                _ => OutputFormat::Text,
            }
        };
        Self {
            format,
            pretty,
            use_color: detect_color(!no_color),
            verbose,
        }
    }
}

pub fn detect_color(color_flag: bool) -> bool {
    if !color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    atty_stdout()
}

fn atty_stdout() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_wins_over_format() {
        let opts = OutputOptions::resolve(Some("text"), true, false, true, false);
        assert_eq!(opts.format, OutputFormat::Json);
    }

    #[test]
    fn format_json_is_recognized() {
        let opts = OutputOptions::resolve(Some("json"), false, true, true, false);
        assert_eq!(opts.format, OutputFormat::Json);
        assert!(opts.pretty);
    }

    #[test]
    fn default_format_is_text() {
        let opts = OutputOptions::resolve(None, false, false, true, false);
        assert_eq!(opts.format, OutputFormat::Text);
        assert!(!opts.use_color);
    }
}
