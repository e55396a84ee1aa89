use std::fmt::Display;

#[derive(Clone, Debug, PartialEq)]
pub enum Codec {
    H264,
    AAC,
}

/// Fixed audio bitrate for AAC output.
pub const AUDIO_BITRATE: &str = "128k";

impl Codec {
    pub fn encoder(codec: &Codec) -> &'static str {
        match codec {
            Codec::H264 => "libx264",
            Codec::AAC => "aac",
        }
    }

    pub fn parameters(codec: &Codec) -> Vec<String> {
        match codec {
            Codec::H264 => vec![
                String::from("-c:v"), String::from(Codec::encoder(codec)),
            ],
            Codec::AAC => vec![
                String::from("-c:a"), String::from(Codec::encoder(codec)),
                String::from("-b:a"), String::from(AUDIO_BITRATE),
            ],
        }
    }
}

impl Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Codec::H264), "h264");
        assert_eq!(format!("{}", Codec::AAC), "aac");
    }

    #[test]
    fn test_parameters() {
        assert_eq!(Codec::parameters(&Codec::H264), vec!["-c:v", "libx264"]);
        assert_eq!(Codec::parameters(&Codec::AAC), vec!["-c:a", "aac", "-b:a", "128k"]);
    }
}
