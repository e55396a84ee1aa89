use std::ffi::OsStr;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Container {
    QuickTime,
    MP4,
}

impl ToString for Container {
    fn to_string(&self) -> String {
        match self {
            Container::QuickTime => String::from("mov"),
            Container::MP4 => String::from("mp4"),
        }
    }
}

/// Container of the files we look for.
pub const SOURCE: Container = Container::QuickTime;

/// Container we write.
pub const TARGET: Container = Container::MP4;

impl Container {
    pub fn extension(container: Container) -> &'static str {
        match container {
            Container::QuickTime => "mov",
            Container::MP4 => "mp4",
        }
    }

    /// Case-insensitive extension match: `.mov` and `.MOV` both count.
    pub fn matches(container: Container, path: &Path) -> bool {
        match path.extension().and_then(OsStr::to_str) {
            Some(e) => e.eq_ignore_ascii_case(Container::extension(container)),
            None => false,
        }
    }

    pub fn parameters(container: Container) -> Vec<String> {
        match container {
            Container::QuickTime | Container::MP4 => vec![
                String::from("-movflags"),
                String::from("+faststart"),
                String::from("-f"),
                container.to_string(),
            ],
        }
    }
}
