//! Commenter identity lookups against the Flickr REST API.
//!
//! The export metadata carries commenter user IDs but no display names,
//! so each distinct commenter costs one `flickr.people.getInfo` round
//! trip per run. Results (including failures) are cached for the run, so
//! a dead endpoint costs at most one attempt per user.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context as _;

pub const DEFAULT_API_BASE: &str = "https://api.flickr.com";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const LOOKUP_ATTEMPTS: u32 = 2;

/// Resolved display identity for a commenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub display_name: String,
    pub profile_url: String,
}

impl Author {
    fn fallback() -> Self {
        Self {
            display_name: "Flickr User".to_owned(),
            profile_url: String::new(),
        }
    }
}

pub struct UserLookup {
    client: reqwest::blocking::Client,
    endpoint_base: String,
    cache: HashMap<String, Author>,
}

impl UserLookup {
    pub fn new(api_base: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .context("build flickr api client")?;
        let endpoint_base = format!(
            "{}/services/rest/?method=flickr.people.getInfo&api_key={}&format=json&nojsoncallback=1&user_id=",
            api_base.trim_end_matches('/'),
            api_key,
        );

        Ok(Self {
            client,
            endpoint_base,
            cache: HashMap::new(),
        })
    }

    /// Resolves a remote user ID to display values. Lookup failures and
    /// incomplete profiles degrade to fallbacks; this never fails the
    /// caller.
    pub fn resolve(&mut self, user_id: &str) -> Author {
        if let Some(author) = self.cache.get(user_id) {
            return author.clone();
        }

        let author = match self.fetch(user_id) {
            Ok(author) => author,
            Err(err) => {
                tracing::warn!(
                    user_id,
                    err = format!("{err:#}"),
                    "flickr user lookup failed; using fallback author"
                );
                Author::fallback()
            }
        };

        self.cache.insert(user_id.to_owned(), author.clone());
        author
    }

    fn fetch(&self, user_id: &str) -> anyhow::Result<Author> {
        let url = format!("{}{user_id}", self.endpoint_base);

        let mut last_error = None;
        for _ in 0..LOOKUP_ATTEMPTS {
            match self.fetch_once(&url) {
                Ok(profile) => return Ok(author_from_profile(&profile)),
                Err(err) => last_error = Some(err),
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no lookup attempt made")))
    }

    fn fetch_once(&self, url: &str) -> anyhow::Result<serde_json::Value> {
        let response = self
            .client
            .get(url)
            .send()
            .context("send flickr api request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("flickr api error ({status})");
        }

        response.json().context("parse flickr api response")
    }
}

/// Fallback chain for the display name: real name, then username, then
/// the literal `"Flickr User"`. The profile URL defaults to empty.
pub fn author_from_profile(profile: &serde_json::Value) -> Author {
    let person = profile.get("person");
    let content = |field: &str| -> Option<String> {
        person?
            .get(field)?
            .get("_content")?
            .as_str()
            .map(str::to_owned)
            .filter(|s| !s.trim().is_empty())
    };

    Author {
        display_name: content("realname")
            .or_else(|| content("username"))
            .unwrap_or_else(|| "Flickr User".to_owned()),
        profile_url: content("photosurl").unwrap_or_default(),
    }
}
