//! Serde helpers shared by the configuration domains

/// Durations written either as whole seconds (`30`) or as humantime text
/// (`"1m 30s"`, `"250ms"`). Serialized as humantime text.
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime_serde::serialize(duration, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
            Raw::Text(text) => humantime_serde::re::humantime::parse_duration(text.trim())
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::serde_duration")]
        wait: Duration,
    }

    #[test]
    fn test_seconds_and_text_forms() {
        let seconds: Wrapper = serde_yaml::from_str("wait: 5").unwrap();
        assert_eq!(seconds.wait, Duration::from_secs(5));

        let text: Wrapper = serde_yaml::from_str("wait: 1500ms").unwrap();
        assert_eq!(text.wait, Duration::from_millis(1500));

        assert!(serde_yaml::from_str::<Wrapper>("wait: soon").is_err());
    }

    #[test]
    fn test_serializes_as_text() {
        let yaml = serde_yaml::to_string(&Wrapper {
            wait: Duration::from_secs(90),
        })
        .unwrap();
        assert!(yaml.contains("1m 30s"));
    }
}
