//! MQTT topic filters (`+` matches one level, `#` the rest).

use vigil_core::ConfigResult;
use vigil_core::config::check_topic_filter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Level {
    Literal(String),
    Single,
    Multi,
}

/// A parsed topic filter that can also extract what its wildcards matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    filter: String,
    levels: Vec<Level>,
}

impl TopicPattern {
    pub fn parse(filter: &str) -> ConfigResult<Self> {
        check_topic_filter(filter)?;

        let levels = filter
            .split('/')
            .map(|part| match part {
                "+" => Level::Single,
                "#" => Level::Multi,
                p => Level::Literal(p.to_string()),
            })
            .collect();

        Ok(Self {
            filter: filter.to_string(),
            levels,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.filter
    }

    pub fn has_wildcards(&self) -> bool {
        self.levels.iter().any(|l| !matches!(l, Level::Literal(_)))
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.captures(topic).is_some()
    }

    /// Match `topic`, returning what each wildcard stood for. A trailing
    /// `#` captures the remaining levels joined by `/` (empty when the
    /// topic is the filter's parent).
    pub fn captures(&self, topic: &str) -> Option<Vec<String>> {
        let parts: Vec<&str> = topic.split('/').collect();
        let mut captured = Vec::new();

        for (i, level) in self.levels.iter().enumerate() {
            match level {
                Level::Multi => {
                    captured.push(parts.get(i..).map(|rest| rest.join("/")).unwrap_or_default());
                    return Some(captured);
                }
                Level::Single => captured.push(parts.get(i)?.to_string()),
                Level::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
            }
        }

        (parts.len() == self.levels.len()).then_some(captured)
    }

    /// Entity key for `topic`: the fixed override if any, else the wildcard
    /// captures, else the topic itself. Empty keys are rejected.
    pub fn entity_key(&self, topic: &str, fixed: Option<&str>) -> Option<String> {
        let captures = self.captures(topic)?;
        let key = match fixed {
            Some(fixed) => fixed.to_string(),
            None if self.has_wildcards() => captures.join("/"),
            None => topic.to_string(),
        };
        (!key.is_empty()).then_some(key)
    }
}
