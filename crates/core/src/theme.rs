//! Conversation themes: a theme id maps to three topic labels and their
//! images. The catalog ships built in; a theme endpoint can serve the same
//! data remotely (`GET /theme?themeId=<3-digit>`).

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub topics: [String; 3],
}

/// Wire shape of the theme endpoint response.
#[derive(Debug, Deserialize, Serialize)]
pub struct ThemeEnvelope {
    pub theme: Theme,
}

impl Theme {
    fn new(id: &str, topics: [&str; 3]) -> Self {
        Self {
            id: id.to_string(),
            topics: topics.map(String::from),
        }
    }

    /// Looks a theme up in the built-in catalog.
    pub fn builtin(id: &str) -> Option<Theme> {
        let topics = match id {
            "000" => ["Family Gatherings", "Holiday Celebrations", "Travel Adventures"],
            "001" => ["Exercise and Fitness", "Nutrition and Cooking", "Mental Well-being"],
            "002" => ["Gardening", "Art and Crafting", "Reading and Literature"],
            "003" => ["Volunteering", "Social Clubs", "Cultural Events"],
            "004" => ["Learning New Skills", "Staying Connected", "Smart Home Technology"],
            "005" => ["Road Trips", "Cultural Expeditions", "Nature Retreats"],
            "006" => ["Family History", "Personal Projects", "Cultural Traditions"],
            "007" => ["Financial Literacy", "Home Maintenance", "Cooking for One"],
            "008" => ["Birthdays", "Anniversaries", "Retirement Parties"],
            "009" => ["Theater and Performance", "Music and Dance", "Art Exhibitions"],
            _ => return None,
        };
        Some(Theme::new(id, topics))
    }

    /// All catalog ids, in order.
    pub fn builtin_ids() -> &'static [&'static str] {
        &[
            "000", "001", "002", "003", "004", "005", "006", "007", "008", "009",
        ]
    }

    /// The display URL for one of this theme's topic images. Topic ids are
    /// "1".."3".
    pub fn image_url(&self, base_url: &str, topic_id: &str) -> String {
        format!("{}/{}/{}.jpg", base_url.trim_end_matches('/'), self.id, topic_id)
    }

    /// Fuzzy-matches a spoken utterance against the topic labels and returns
    /// the best-scoring topic id, if any label clears the threshold.
    pub fn match_topic(&self, utterance: &str) -> Option<String> {
        let matcher = SkimMatcherV2::default();
        let utterance = utterance.to_lowercase();

        self.topics
            .iter()
            .enumerate()
            .filter_map(|(idx, label)| {
                matcher
                    .fuzzy_match(&utterance, &label.to_lowercase())
                    .filter(|score| *score > 70)
                    .map(|score| (idx, score))
            })
            .max_by_key(|(_, score)| *score)
            .map(|(idx, _)| (idx + 1).to_string())
    }
}

/// Client for the remote theme endpoint.
pub struct ThemeClient {
    http: reqwest::Client,
    base_url: String,
}

impl ThemeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetches a theme by id; falls back to the built-in catalog when the
    /// endpoint is unreachable or does not know the id.
    pub async fn fetch(&self, theme_id: &str) -> anyhow::Result<Theme> {
        let url = format!("{}/theme", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("themeId", theme_id)])
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let envelope = resp.json::<ThemeEnvelope>().await?;
                Ok(envelope.theme)
            }
            other => {
                if let Err(e) = other {
                    tracing::warn!("theme endpoint unreachable, using catalog: {}", e);
                }
                Theme::builtin(theme_id)
                    .ok_or_else(|| anyhow::anyhow!("unknown theme id: {}", theme_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_serves_theme_001() {
        let theme = Theme::builtin("001").expect("001 is in the catalog");
        assert_eq!(
            theme.topics,
            [
                "Exercise and Fitness".to_string(),
                "Nutrition and Cooking".to_string(),
                "Mental Well-being".to_string()
            ]
        );
    }

    #[test]
    fn unknown_theme_id_is_none() {
        assert!(Theme::builtin("999").is_none());
        assert!(Theme::builtin("1").is_none());
    }

    #[test]
    fn every_catalog_id_resolves() {
        for id in Theme::builtin_ids() {
            let theme = Theme::builtin(id).expect("catalog id must resolve");
            assert_eq!(theme.id, *id);
        }
    }

    #[test]
    fn image_url_composition() {
        let theme = Theme::builtin("001").unwrap();
        assert_eq!(
            theme.image_url("https://imgs.example.org/", "2"),
            "https://imgs.example.org/001/2.jpg"
        );
    }

    #[test]
    fn spoken_topic_matches_by_label() {
        let theme = Theme::builtin("001").unwrap();
        assert_eq!(
            theme.match_topic("let's talk about nutrition and cooking please"),
            Some("2".to_string())
        );
        assert_eq!(theme.match_topic("what a sunny day"), None);
    }

    #[test]
    fn envelope_round_trips() {
        let raw = r#"{"theme":{"id":"003","topics":["Volunteering","Social Clubs","Cultural Events"]}}"#;
        let envelope: ThemeEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.theme, Theme::builtin("003").unwrap());
    }
}
