//! Air quality index per monitoring site.

use super::{DatasetDefinition, DatasetKind};
use crate::config::EndpointSpec;
use crate::decode::PayloadFormat;
use crate::normalize::{NormalizationRule, RuleSet, Transform};
use std::time::Duration;

pub(super) fn definition() -> DatasetDefinition {
    DatasetDefinition {
        kind: DatasetKind::AirQuality,
        format: PayloadFormat::Json,
        ttl: Duration::from_secs(900),
        endpoints: vec![
            EndpointSpec::new("https://data.moenv.gov.tw/api/v2/aqx_p_432")
                .with_query("format", "json")
                .with_query("limit", "1000")
                .requiring_credential_as("api_key"),
            EndpointSpec::new("https://data.moenv.gov.tw/api/v1/aqx_p_432")
                .with_query("format", "json"),
        ],
        rules: rules(),
    }
}

fn rules() -> RuleSet {
    RuleSet::new(
        &["records", "", "data"],
        &["sitename", "SiteName", "siteid"],
        vec![
            NormalizationRule::new("site_id", &["siteid", "SiteId"]).with(Transform::Text),
            NormalizationRule::new("site_name", &["sitename", "SiteName"]).with(Transform::Text),
            NormalizationRule::new("region", &["county", "County"]).with(Transform::Region),
            NormalizationRule::new("published_at", &["publishtime", "PublishTime"])
                .with(Transform::Timestamp),
            NormalizationRule::new("aqi", &["aqi", "AQI"]).with(Transform::Number),
            NormalizationRule::new("status", &["status", "Status"]).with(Transform::Text),
            NormalizationRule::new("pollutant", &["pollutant", "Pollutant"]).with(Transform::Text),
            NormalizationRule::new("pm25", &["pm2.5", "PM2.5", "pm25"]).with(Transform::Number),
            NormalizationRule::new("pm10", &["pm10", "PM10"]).with(Transform::Number),
            NormalizationRule::new("o3", &["o3", "O3"]).with(Transform::Number),
        ],
    )
}
