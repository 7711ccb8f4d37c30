//! Typed configuration tree (spec §6), loaded once at startup and shared as `Arc<Config>`.
//!
//! Replaces the original's dynamically typed nested dict with explicit tagged-union
//! option types (spec §9 design note): every recognized YAML key gets a named field.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_yaml::Value;

use crate::constants;
use crate::util::leaves::leaves;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    Channel,
    Feed,
}

impl Default for DedupScope {
    fn default() -> Self {
        DedupScope::Channel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewFeedPolicy {
    None,
    #[serde(rename = "some")]
    Some3,
    All,
}

impl Default for NewFeedPolicy {
    fn default() -> Self {
        NewFeedPolicy::Some3
    }
}

/// Which filter/substitution/format attribute a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Title,
    Url,
    Summary,
}

#[derive(Debug, Clone, Default)]
pub struct FilterLists {
    pub title: Vec<String>,
    pub url: Vec<String>,
    pub category: Vec<String>,
}

impl FilterLists {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(Value::Mapping(map)) = value else {
            return Self::default();
        };
        let get = |key: &str| {
            map.get(Value::String(key.to_string()))
                .map(leaves)
                .unwrap_or_default()
        };
        Self {
            title: get("title"),
            url: get("url"),
            category: get("category"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubRule {
    pub pattern: String,
    pub repl: String,
}

#[derive(Debug, Clone, Default)]
pub struct SubstitutionRules {
    pub title: Option<SubRule>,
    pub url: Option<SubRule>,
    pub summary: Option<SubRule>,
}

#[derive(Debug, Clone, Default)]
pub struct FormatRules {
    /// Per-attribute extraction regex whose named capture groups feed the template.
    pub re: HashMap<Attribute, String>,
    /// Per-attribute `{name}`-style format template.
    pub str: HashMap<Attribute, String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertGate {
    pub read: bool,
    pub empty: bool,
}

impl AlertGate {
    fn default_on() -> Self {
        Self { read: true, empty: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleRule {
    pub fg: Option<String>,
    pub bg: Option<String>,
    pub bold: bool,
    pub italics: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MessageTemplates {
    pub title: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ParserSpec {
    Syndication,
    JsonPath { select: String, follow: Option<String> },
    HtmlSelector { select: String, follow: Option<String> },
    Tabular { select: String, follow: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct FeedDefaults {
    pub new: Option<NewFeedPolicy>,
    pub shorten: Option<bool>,
    pub https: Option<bool>,
    pub www: Option<bool>,
    pub dedup: Option<DedupScope>,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: Vec<String>,
    pub period_hours: f64,
    pub parser: ParserSpec,
    pub blacklist: FilterLists,
    pub whitelist: FilterLists,
    pub whitelist_explain: bool,
    pub https_upgrade: bool,
    pub strip_www: bool,
    pub sub: SubstitutionRules,
    pub format: FormatRules,
    pub dedup: DedupScope,
    pub new: NewFeedPolicy,
    pub shorten: bool,
    pub group: Option<String>,
    pub topic: HashMap<String, String>,
    pub alerts: AlertGate,
    pub style: HashMap<String, StyleRule>,
    pub message: MessageTemplates,
}

impl FeedConfig {
    fn from_value(name: &str, value: &Value, defaults: &FeedDefaults) -> Result<Self> {
        let map = value
            .as_mapping()
            .with_context(|| format!("feed {name} config must be a mapping"))?;
        let get = |key: &str| map.get(Value::String(key.to_string()));

        let url = match get("url") {
            Some(Value::Sequence(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => anyhow::bail!("feed {name} is missing required `url`"),
        };
        if url.is_empty() {
            anyhow::bail!("feed {name} has an empty `url` list");
        }

        let period_hours = get("period")
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
            .max(constants::period_hours_min());

        let parser = parse_parser_spec(name, map)?;

        let bool_field = |key: &str, fallback: bool| get(key).and_then(Value::as_bool).unwrap_or(fallback);

        let https_upgrade = bool_field("https", defaults.https.unwrap_or(false));
        let strip_www = bool_field("www", defaults.www.unwrap_or(false));
        let shorten = bool_field("shorten", defaults.shorten.unwrap_or(true));

        let dedup = get("dedup")
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()
            .context("invalid `dedup`")?
            .unwrap_or(defaults.dedup.unwrap_or_default());

        let new = get("new")
            .map(|v| serde_yaml::from_value(v.clone()))
            .transpose()
            .context("invalid `new`")?
            .unwrap_or(defaults.new.unwrap_or_default());

        let blacklist = FilterLists::from_value(get("blacklist"));
        let (whitelist, whitelist_explain) = match get("whitelist") {
            Some(Value::Mapping(wmap)) => {
                let explain = wmap
                    .get(Value::String("explain".to_string()))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (FilterLists::from_value(get("whitelist")), explain)
            }
            _ => (FilterLists::default(), false),
        };

        let sub = parse_sub_rules(get("sub"));
        let format = parse_format_rules(get("format"))?;
        let group = get("group").and_then(Value::as_str).map(str::to_string);
        let topic = parse_string_map(get("topic"));
        let alerts = parse_alert_gate(get("alerts"));
        let style = parse_style_map(get("style"));
        let message = MessageTemplates {
            title: get("message")
                .and_then(|v| v.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string),
            summary: get("message")
                .and_then(|v| v.get("summary"))
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        Ok(Self {
            name: name.to_string(),
            url,
            period_hours,
            parser,
            blacklist,
            whitelist,
            whitelist_explain,
            https_upgrade,
            strip_www,
            sub,
            format,
            dedup,
            new,
            shorten,
            group,
            topic,
            alerts,
            style,
            message,
        })
    }
}

fn parse_parser_spec(name: &str, map: &serde_yaml::Mapping) -> Result<ParserSpec> {
    let get_str = |key: &str| {
        map.get(Value::String(key.to_string()))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    if let Some(select) = get_str("jmespath") {
        return Ok(ParserSpec::JsonPath { select, follow: get_str("follow") });
    }
    if let Some(select) = get_str("hext") {
        return Ok(ParserSpec::HtmlSelector { select, follow: get_str("follow") });
    }
    if let Some(select) = get_str("pandas") {
        return Ok(ParserSpec::Tabular { select, follow: get_str("follow") });
    }
    let _ = name;
    Ok(ParserSpec::Syndication)
}

fn parse_sub_rules(value: Option<&Value>) -> SubstitutionRules {
    let Some(Value::Mapping(map)) = value else {
        return SubstitutionRules::default();
    };
    let rule_for = |key: &str| -> Option<SubRule> {
        let v = map.get(Value::String(key.to_string()))?;
        let pattern = v.get("pattern")?.as_str()?.to_string();
        let repl = v.get("repl")?.as_str()?.to_string();
        Some(SubRule { pattern, repl })
    };
    SubstitutionRules {
        title: rule_for("title"),
        url: rule_for("url"),
        summary: rule_for("summary"),
    }
}

fn parse_format_rules(value: Option<&Value>) -> Result<FormatRules> {
    let Some(Value::Mapping(map)) = value else {
        return Ok(FormatRules::default());
    };
    let mut re = HashMap::new();
    if let Some(Value::Mapping(re_map)) = map.get(Value::String("re".to_string())) {
        for (k, v) in re_map {
            if let (Some(attr), Some(pattern)) = (k.as_str(), v.as_str()) {
                if let Ok(attr) = serde_yaml::from_value::<Attribute>(Value::String(attr.to_string())) {
                    re.insert(attr, pattern.to_string());
                }
            }
        }
    }
    let mut str_map = HashMap::new();
    if let Some(Value::Mapping(str_mapping)) = map.get(Value::String("str".to_string())) {
        for (k, v) in str_mapping {
            if let (Some(attr), Some(template)) = (k.as_str(), v.as_str()) {
                if let Ok(attr) = serde_yaml::from_value::<Attribute>(Value::String(attr.to_string())) {
                    str_map.insert(attr, template.to_string());
                }
            }
        }
    }
    Ok(FormatRules { re, str: str_map })
}

fn parse_string_map(value: Option<&Value>) -> HashMap<String, String> {
    let Some(Value::Mapping(map)) = value else {
        return HashMap::new();
    };
    map.iter()
        .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
        .collect()
}

fn parse_alert_gate(value: Option<&Value>) -> AlertGate {
    let Some(Value::Mapping(map)) = value else {
        return AlertGate::default_on();
    };
    AlertGate {
        read: map
            .get(Value::String("read".to_string()))
            .and_then(Value::as_bool)
            .unwrap_or(true),
        empty: map
            .get(Value::String("empty".to_string()))
            .and_then(Value::as_bool)
            .unwrap_or(true),
    }
}

fn parse_style_map(value: Option<&Value>) -> HashMap<String, StyleRule> {
    let Some(Value::Mapping(outer)) = value else {
        return HashMap::new();
    };
    let Some(Value::Mapping(named)) = outer.get(Value::String("name".to_string())) else {
        return HashMap::new();
    };
    named
        .iter()
        .filter_map(|(name, rule)| {
            let name = name.as_str()?.to_string();
            let rule = StyleRule {
                fg: rule.get("fg").and_then(Value::as_str).map(str::to_string),
                bg: rule.get("bg").and_then(Value::as_str).map(str::to_string),
                bold: rule.get("bold").and_then(Value::as_bool).unwrap_or(false),
                italics: rule.get("italics").and_then(Value::as_bool).unwrap_or(false),
            };
            Some((name, rule))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub kind: String,
    pub repo: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub ssl_port: u16,
    pub nick: String,
    pub nick_password: Option<String>,
    pub mode: String,
    pub ssl_verify: bool,
    pub alerts_channel: String,
    pub admin: String,
    pub mirror: Option<String>,
    pub once: bool,
    pub log_irc: bool,
    pub publish: HashMap<String, PublisherConfig>,
    pub feeds: HashMap<String, HashMap<String, FeedConfig>>,
    pub dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let root: Value = serde_yaml::from_str(&text).context("parsing config YAML")?;
        let map = root.as_mapping().context("config root must be a mapping")?;
        let get = |key: &str| map.get(Value::String(key.to_string()));
        let get_str_req = |key: &str| -> Result<String> {
            get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .with_context(|| format!("config is missing required key `{key}`"))
        };

        let nick = get_str_req("nick")?;
        let alerts_channel_format = get("alerts_channel")
            .and_then(Value::as_str)
            .unwrap_or(constants::ALERTS_CHANNEL_FORMAT_DEFAULT);
        let alerts_channel = alerts_channel_format.replace("{nick}", &nick);

        let defaults = FeedDefaults {
            new: get("defaults")
                .and_then(|d| d.get("new"))
                .and_then(|v| serde_yaml::from_value(v.clone()).ok()),
            shorten: get("defaults").and_then(|d| d.get("shorten")).and_then(Value::as_bool),
            https: get("defaults").and_then(|d| d.get("https")).and_then(Value::as_bool),
            www: get("defaults").and_then(|d| d.get("www")).and_then(Value::as_bool),
            dedup: get("defaults")
                .and_then(|d| d.get("dedup"))
                .and_then(|v| serde_yaml::from_value(v.clone()).ok()),
        };

        let mut feeds = HashMap::new();
        if let Some(Value::Mapping(scopes)) = get("feeds") {
            for (scope, scope_feeds) in scopes {
                let scope = scope.as_str().context("scope name must be a string")?.to_string();
                let mut feed_map = HashMap::new();
                if let Value::Mapping(fm) = scope_feeds {
                    for (feed_name, feed_value) in fm {
                        let feed_name = feed_name.as_str().context("feed name must be a string")?;
                        let feed = FeedConfig::from_value(feed_name, feed_value, &defaults)
                            .with_context(|| format!("parsing feed {scope}/{feed_name}"))?;
                        feed_map.insert(feed_name.to_string(), feed);
                    }
                }
                feeds.insert(scope, feed_map);
            }
        }
        feeds.entry(alerts_channel.clone()).or_default();

        let mut publish = HashMap::new();
        if let Some(Value::Mapping(pmap)) = get("publish") {
            for (name, pcfg) in pmap {
                let name = name.as_str().context("publisher name must be a string")?.to_string();
                let kind = pcfg
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("github")
                    .to_string();
                let repo = pcfg.get("repo").and_then(Value::as_str).unwrap_or_default().to_string();
                publish.insert(name, PublisherConfig { kind, repo });
            }
        }

        Ok(Self {
            host: get_str_req("host")?,
            ssl_port: get("ssl_port").and_then(Value::as_u64).unwrap_or(6697) as u16,
            nick,
            nick_password: get("nick_password").and_then(Value::as_str).map(str::to_string),
            mode: get("mode").and_then(Value::as_str).unwrap_or("+B").to_string(),
            ssl_verify: get("ssl_verify").and_then(Value::as_bool).unwrap_or(true),
            alerts_channel,
            admin: get_str_req("admin")?,
            mirror: get("mirror").and_then(Value::as_str).map(str::to_string),
            once: get("once").and_then(Value::as_bool).unwrap_or(false),
            log_irc: get("log")
                .and_then(|l| l.get("irc"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            publish,
            feeds,
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        })
    }

    pub fn scopes_casefold(&self) -> Vec<String> {
        self.feeds.keys().map(|s| s.to_lowercase()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_minimal_config() {
        let yaml = r##"
host: irc.example.com
nick: feedbot
admin: "admin!*@*"
feeds:
  "#chan":
    myfeed:
      url: https://example.com/feed.xml
"##;
        let (_dir, path) = write_config(yaml);
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.nick, "feedbot");
        assert_eq!(cfg.alerts_channel, "##feedbot-alerts");
        assert!(cfg.feeds.contains_key("#chan"));
        assert!(cfg.feeds.contains_key("##feedbot-alerts"));
        let feed = &cfg.feeds["#chan"]["myfeed"];
        assert_eq!(feed.url, vec!["https://example.com/feed.xml"]);
        assert!(matches!(feed.parser, ParserSpec::Syndication));
        assert!(feed.shorten);
    }

    #[test]
    fn nested_blacklist_patterns_are_flattened() {
        let yaml = r##"
host: irc.example.com
nick: feedbot
admin: "admin!*@*"
feeds:
  "#chan":
    myfeed:
      url: https://example.com/feed.xml
      blacklist:
        title:
          - spam
          - [promo, ad]
"##;
        let (_dir, path) = write_config(yaml);
        let cfg = Config::load(&path).unwrap();
        let feed = &cfg.feeds["#chan"]["myfeed"];
        let mut patterns = feed.blacklist.title.clone();
        patterns.sort();
        assert_eq!(patterns, vec!["ad", "promo", "spam"]);
    }

    #[test]
    fn jmespath_parser_is_recognized() {
        let yaml = r##"
host: irc.example.com
nick: feedbot
admin: "admin!*@*"
feeds:
  "#chan":
    myfeed:
      url: https://example.com/data.json
      jmespath: "items[*]"
"##;
        let (_dir, path) = write_config(yaml);
        let cfg = Config::load(&path).unwrap();
        let feed = &cfg.feeds["#chan"]["myfeed"];
        match &feed.parser {
            ParserSpec::JsonPath { select, .. } => assert_eq!(select, "items[*]"),
            other => panic!("expected JsonPath, got {other:?}"),
        }
    }
}
