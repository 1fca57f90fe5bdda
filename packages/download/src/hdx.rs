//! HDX dataset search.
//!
//! HDX runs CKAN, so datasets are found with the `package_search` action.
//! Only CSV resources (plain or zipped) are listed, since those are what
//! [`crate::population`] can read. For the Data for Good population maps
//! each resource also gets a population label derived from its file name.
//!
//! See <https://docs.ckan.org/en/latest/api/>

use crate::{DownloadError, get_json};

/// CKAN `package_search` endpoint on HDX.
pub const HDX_SEARCH_URL: &str = "https://data.humdata.org/api/3/action/package_search";

/// Repository of the high-resolution population density maps.
pub const POPULATION_REPOSITORY: &str =
    "high-resolution-population-density-maps-demographic-estimates";

/// File name fragments and the population they describe, checked in order.
const POPULATION_LABELS: &[(&str, &str)] = &[
    ("overall", "Overall population density"),
    ("women", "Women"),
    ("_men_", "Men"),
    ("children", "Children (ages 0-5)"),
    ("youth", "Youth (ages 15-24)"),
    ("elderly", "Elderly (ages 60+)"),
    (
        "women_of_reproductive_age",
        "Women of reproductive age (ages 15-49)",
    ),
];

/// One downloadable CSV resource.
#[derive(Debug, Clone, PartialEq)]
pub struct HdxResource {
    pub name: String,
    /// Download URL, usable with
    /// [`download_population`](crate::population::download_population).
    pub url: String,
    /// Creation date as `YYYY-MM-DD`.
    pub created: Option<String>,
    pub size_mb: Option<f64>,
    /// Population group, only for the population density repository.
    pub population: Option<&'static str>,
}

/// Population group named by a Data for Good file name. Names without a
/// known group are the overall map.
#[must_use]
pub fn population_label(name: &str) -> &'static str {
    POPULATION_LABELS
        .iter()
        .find(|(key, _)| name.contains(key) && !(*key == "women" && name.contains("reproductive")))
        .map_or(POPULATION_LABELS[0].1, |(_, label)| label)
}

/// Lists CSV resources of the `{country}-{repository}` datasets.
///
/// # Errors
///
/// Returns [`DownloadError`] if the request fails or the response is not a
/// CKAN search result.
pub async fn search_datasets(
    client: &reqwest::Client,
    base_url: &str,
    country: &str,
    repository: &str,
) -> Result<Vec<HdxResource>, DownloadError> {
    let query = format!("title:{}-{repository}", country.to_lowercase());
    let body = get_json(client, base_url, &[("q", query.as_str()), ("rows", "50")]).await?;

    let resources = parse_search(&body, repository == POPULATION_REPOSITORY)?;
    if resources.is_empty() {
        log::warn!("HDX: no CSV resources for '{query}'");
    } else {
        log::info!("HDX: {} CSV resources for '{query}'", resources.len());
    }
    Ok(resources)
}

/// Parses a CKAN `package_search` response into CSV resources, in dataset
/// then resource order.
///
/// # Errors
///
/// Returns [`DownloadError::Parse`] if `success` is not `true` or there is
/// no `result.results` array.
pub fn parse_search(
    body: &serde_json::Value,
    label_population: bool,
) -> Result<Vec<HdxResource>, DownloadError> {
    if body["success"].as_bool() != Some(true) {
        return Err(DownloadError::Parse {
            message: format!("HDX search failed: {}", body["error"]),
        });
    }
    let datasets = body["result"]["results"]
        .as_array()
        .ok_or_else(|| DownloadError::Parse {
            message: "HDX search response has no 'result.results' array".to_string(),
        })?;

    let resources = datasets
        .iter()
        .filter_map(|dataset| dataset["resources"].as_array())
        .flatten()
        .filter_map(|resource| {
            let url = resource["download_url"]
                .as_str()
                .or_else(|| resource["url"].as_str())?;
            if !url.to_ascii_lowercase().contains("csv") {
                return None;
            }
            let name = resource["name"].as_str().unwrap_or_default().to_string();

            #[allow(clippy::cast_precision_loss)]
            let size_mb = resource["size"]
                .as_u64()
                .map(|bytes| (bytes as f64 / 1_048_576.0 * 100.0).round() / 100.0);

            Some(HdxResource {
                population: label_population.then(|| population_label(&name)),
                url: url.to_string(),
                created: resource["created"]
                    .as_str()
                    .map(|c| c.chars().take(10).collect()),
                size_mb,
                name,
            })
        })
        .collect();

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_file_names() {
        assert_eq!(
            population_label("population_per_2018-10-01.csv.zip"),
            "Overall population density"
        );
        assert_eq!(population_label("PER_women_2019-06-01_csv.zip"), "Women");
        assert_eq!(population_label("PER_men_2019-06-01_csv.zip"), "Men");
        assert_eq!(
            population_label("PER_women_of_reproductive_age_15_49_2019-06-01_csv.zip"),
            "Women of reproductive age (ages 15-49)"
        );
        assert_eq!(
            population_label("PER_children_under_five_2019-06-01_csv.zip"),
            "Children (ages 0-5)"
        );
    }

    #[test]
    fn keeps_only_csv_resources() {
        let body = serde_json::json!({
            "success": true,
            "result": {
                "count": 1,
                "results": [{
                    "name": "peru-high-resolution-population-density-maps",
                    "resources": [
                        {
                            "name": "population_per_2018-10-01.csv.zip",
                            "download_url": "https://data.humdata.org/dataset/4e74/resource/317f/download/population_per_2018-10-01.csv.zip",
                            "created": "2019-06-11T18:03:29.512445",
                            "size": 20_300_000
                        },
                        {
                            "name": "population_per_2018-10-01.tif",
                            "download_url": "https://data.humdata.org/dataset/4e74/resource/aaaa/download/pop.tif",
                            "size": 1
                        },
                        {
                            "name": "PER_elderly_60_plus_2019-06-01_csv.zip",
                            "url": "https://data.humdata.org/dataset/4e74/resource/bbbb/download/PER_elderly_60_plus_2019-06-01_csv.zip"
                        }
                    ]
                }]
            }
        });

        let resources = parse_search(&body, true).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].created.as_deref(), Some("2019-06-11"));
        assert_eq!(resources[0].size_mb, Some(19.36));
        assert_eq!(resources[0].population, Some("Overall population density"));
        assert_eq!(resources[1].population, Some("Elderly (ages 60+)"));
        assert!(resources[1].size_mb.is_none());

        assert!(parse_search(&body, false).unwrap()[0].population.is_none());
    }

    #[test]
    fn unsuccessful_search_is_parse_error() {
        let body = serde_json::json!({"success": false, "error": {"message": "boom"}});
        assert!(matches!(
            parse_search(&body, true),
            Err(DownloadError::Parse { .. })
        ));
    }
}
