use super::wp_manga::{WpManga, WpMangaSite};
use crate::config::Config;
use crate::models::ProviderKind;

pub const DEFAULT_BASE_URL: &str = "https://firescans.xyz";

/// Fire Scans runs the stock Madara theme. Its titles are often padded with
/// translator notes, hence the lower threshold.
pub const SITE: WpMangaSite = WpMangaSite {
    kind: ProviderKind::FireScans,
    name: "Fire Scans",
    default_base_url: DEFAULT_BASE_URL,
    default_threshold: 0.3,
};

pub fn from_config(config: &Config) -> Result<WpManga, reqwest::Error> {
    WpManga::from_config(SITE, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MangaProvider;

    #[test]
    fn test_site_defaults() {
        let provider = from_config(&Config::default()).unwrap();
        assert_eq!(provider.id(), "firescans");
        assert_eq!(provider.base_url(), "https://firescans.xyz");
        assert_eq!(provider.match_threshold(), 0.3);
    }
}
