//! Device topic naming
//!
//! Every device lives under a root topic:
//!
//! ```text
//! <root>/write          command (servo, led; strip replace-all alias)
//! <root>/read           state broadcast on change
//! <root>/write/list     strip: replace every pixel
//! <root>/write/single   strip: one indexed pixel
//! <root>/write/all      strip: one color everywhere
//! ```

/// Topic set for one device root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopics {
    root: String,
}

impl DeviceTopics {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn write(&self) -> String {
        format!("{}/write", self.root)
    }

    pub fn read(&self) -> String {
        format!("{}/read", self.root)
    }

    pub fn write_list(&self) -> String {
        format!("{}/write/list", self.root)
    }

    pub fn write_single(&self) -> String {
        format!("{}/write/single", self.root)
    }

    pub fn write_all(&self) -> String {
        format!("{}/write/all", self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_names() {
        let topics = DeviceTopics::new("puppet/mouth/");
        assert_eq!(topics.root(), "puppet/mouth");
        assert_eq!(topics.write(), "puppet/mouth/write");
        assert_eq!(topics.read(), "puppet/mouth/read");
        assert_eq!(topics.write_list(), "puppet/mouth/write/list");
        assert_eq!(topics.write_single(), "puppet/mouth/write/single");
        assert_eq!(topics.write_all(), "puppet/mouth/write/all");
    }
}
