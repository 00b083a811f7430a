use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Embedded stream provider database.
const EMBEDDED_DB: &str = include_str!("../data/streams.toml");

/// Leading unread-notification counters, e.g. "(3) ".
static RE_NOTIFICATION_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\d+\+?\)\s*").unwrap());

/// Leading "now playing" glyphs some sites add to the document title.
static RE_PLAYING_GLYPH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\u{25B6}\u{25BA}\u{1F50A}\u{1F508}]\s*").unwrap());

/// Browser names appended to window titles.
static RE_BROWSER_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\s+[-\u{2013}\u{2014}]\s+",
        r"(?:Mozilla Firefox|Firefox|Google Chrome|Chromium|Microsoft\u{200B}?\s?Edge",
        r"|Brave|Opera|Vivaldi)(?:\s+Private Browsing)?$",
    ))
    .unwrap()
});

/// Separators between a page title and the site name.
const SITE_SEPARATORS: &[&str] = &[" - ", " | ", " \u{2013} ", " \u{2014} ", " \u{00B7} "];

/// Title heuristics for web browser pages.
pub trait WebTitleHeuristics {
    /// Clean up a page or tab title in place: decode entities, drop browser
    /// and site decorations.
    fn normalize_title(&self, url: &str, title: &mut String);

    /// Whether `(url, title)` is a video page of a known streaming provider.
    /// May rewrite `title` to the provider's episode title.
    fn match_provider(&self, url: &str, title: &mut String) -> bool;
}

/// Definition of a streaming service and how to detect it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDef {
    /// Display name (e.g., "Crunchyroll", "Netflix").
    pub name: String,
    /// Regex patterns matched against the page URL.
    #[serde(default)]
    pub url_patterns: Vec<String>,
    /// Regex with capture group 1 to extract the episode title from the page title.
    pub title_pattern: String,
    /// Whether this stream provider is enabled for detection.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Database of known streaming services.
#[derive(Debug, Clone, Default)]
pub struct StreamDatabase {
    streams: Vec<StreamDef>,
    compiled_url: Vec<Vec<Regex>>,
    compiled_title: Vec<Option<Regex>>,
}

impl StreamDatabase {
    /// Load the embedded stream database.
    pub fn embedded() -> Self {
        match Self::from_toml(EMBEDDED_DB) {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "Embedded streams.toml is invalid");
                Self::default()
            }
        }
    }

    /// Load the embedded database and merge the user file at `path`, if any.
    pub fn load(path: &Path) -> Self {
        let mut db = Self::embedded();
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(user_db) => db.merge_user(&user_db),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse user stream data");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No user stream file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to read user stream data"),
        }
        db
    }

    /// Load a stream database from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        #[derive(Deserialize)]
        struct StreamDbFile {
            #[serde(rename = "stream", default)]
            streams: Vec<StreamDef>,
        }

        let db: StreamDbFile = toml::from_str(toml_str)?;
        let mut out = Self::default();
        for stream in db.streams {
            out.push(stream);
        }
        Ok(out)
    }

    fn push(&mut self, stream: StreamDef) {
        let (urls, title) = compile(&stream);
        self.streams.push(stream);
        self.compiled_url.push(urls);
        self.compiled_title.push(title);
    }

    /// Merge a user database into this one.
    /// Streams with matching names are replaced; new streams are appended.
    pub fn merge_user(&mut self, user_db: &StreamDatabase) {
        for (i, user_stream) in user_db.streams.iter().enumerate() {
            if let Some(pos) = self.streams.iter().position(|s| s.name == user_stream.name) {
                self.streams[pos] = user_stream.clone();
                self.compiled_url[pos] = user_db.compiled_url[i].clone();
                self.compiled_title[pos] = user_db.compiled_title[i].clone();
            } else {
                self.streams.push(user_stream.clone());
                self.compiled_url.push(user_db.compiled_url[i].clone());
                self.compiled_title.push(user_db.compiled_title[i].clone());
            }
        }
    }

    /// Find the first enabled stream whose URL patterns match.
    pub fn match_url(&self, url: &str) -> Option<usize> {
        self.streams.iter().enumerate().find_map(|(i, s)| {
            if s.enabled && self.compiled_url[i].iter().any(|re| re.is_match(url)) {
                Some(i)
            } else {
                None
            }
        })
    }

    /// Find the first enabled stream whose title pattern matches.
    pub fn match_title(&self, title: &str) -> Option<usize> {
        self.streams.iter().enumerate().find_map(|(i, s)| {
            let re = self.compiled_title[i].as_ref()?;
            (s.enabled && re.is_match(title)).then_some(i)
        })
    }

    /// Extract the episode title from a page title using the stream's title_pattern.
    pub fn extract_title(&self, index: usize, title: &str) -> Option<String> {
        let re = self.compiled_title.get(index)?.as_ref()?;
        let caps = re.captures(title)?;
        let extracted = caps.get(1)?.as_str().trim().to_string();
        if extracted.is_empty() {
            None
        } else {
            Some(extracted)
        }
    }

    /// Get the service name for a matched stream index.
    pub fn service_name(&self, index: usize) -> Option<&str> {
        self.streams.get(index).map(|s| s.name.as_str())
    }

    /// Number of stream definitions.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl WebTitleHeuristics for StreamDatabase {
    fn normalize_title(&self, url: &str, title: &mut String) {
        let decoded = html_escape::decode_html_entities(title.as_str()).into_owned();
        let mut cleaned = RE_NOTIFICATION_COUNT.replace(decoded.trim(), "").into_owned();
        cleaned = RE_PLAYING_GLYPH.replace(&cleaned, "").into_owned();
        cleaned = RE_BROWSER_SUFFIX.replace(&cleaned, "").into_owned();

        // The site suffix is only dropped when the URL tells us which site it is.
        if !url.is_empty() {
            let extracted = self
                .match_url(url)
                .and_then(|index| self.extract_title(index, &cleaned));
            match extracted {
                Some(extracted) => cleaned = extracted,
                None => strip_site_suffix(url, &mut cleaned),
            }
        }

        *title = cleaned.trim().to_string();
    }

    fn match_provider(&self, url: &str, title: &mut String) -> bool {
        if title.is_empty() {
            return false;
        }

        let index = if url.is_empty() {
            self.match_title(title)
        } else {
            self.match_url(url)
        };
        let Some(index) = index else {
            debug!(host = ?host(url), title = %title, "No streaming provider matched");
            return false;
        };

        if let Some(extracted) = self.extract_title(index, title) {
            *title = extracted;
        }
        debug!(
            service = self.service_name(index).unwrap_or_default(),
            title = %title,
            "Streaming provider matched"
        );
        !title.is_empty()
    }
}

fn compile(stream: &StreamDef) -> (Vec<Regex>, Option<Regex>) {
    let urls = stream
        .url_patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(stream = %stream.name, pattern = %p, error = %e, "Invalid URL pattern");
                None
            }
        })
        .collect();
    let title = match Regex::new(&stream.title_pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(stream = %stream.name, error = %e, "Invalid title pattern");
            None
        }
    };
    (urls, title)
}

fn host(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
}

/// Drop a trailing " - Site" when "Site" names the host of `url`.
fn strip_site_suffix(url: &str, title: &mut String) {
    let Some(host) = host(url) else {
        return;
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let Some(label) = host.split('.').next().filter(|l| !l.is_empty()) else {
        return;
    };
    let label = label.to_lowercase();

    for sep in SITE_SEPARATORS {
        if let Some((head, tail)) = title.rsplit_once(sep) {
            let tail: String = tail
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            let labelled = tail.contains(&label) || label.contains(&tail);
            if !head.trim().is_empty() && !tail.is_empty() && labelled {
                *title = head.trim_end().to_string();
                return;
            }
        }
    }
}
