//! Automatic weather station observations.
//!
//! The authenticated REST API nests stations under `records.Station`; the
//! anonymous bucket mirror ships the same file wrapped in `cwaopendata.dataset`
//! and, depending on the variant, as XML.

use super::{DatasetDefinition, DatasetKind};
use crate::config::EndpointSpec;
use crate::decode::PayloadFormat;
use crate::normalize::{NormalizationRule, RuleSet, Transform};
use std::time::Duration;

pub(super) fn definition() -> DatasetDefinition {
    DatasetDefinition {
        kind: DatasetKind::Weather,
        format: PayloadFormat::JsonOrXml,
        ttl: Duration::from_secs(600),
        endpoints: vec![
            EndpointSpec::new("https://opendata.cwa.gov.tw/api/v1/rest/datastore/O-A0003-001")
                .with_query("format", "JSON")
                .requiring_credential(),
            EndpointSpec::new(
                "https://cwaopendata.s3.ap-northeast-1.amazonaws.com/Observation/O-A0003-001.json",
            ),
        ],
        rules: rules(),
    }
}

fn rules() -> RuleSet {
    RuleSet::new(
        &[
            "records.Station",
            "cwaopendata.dataset.Station",
            "cwaopendata.location",
            "records.location",
        ],
        &["StationId", "StationName", "stationId", "locationName"],
        vec![
            NormalizationRule::new("station_id", &["StationId", "stationId"]).with(Transform::Text),
            NormalizationRule::new("station_name", &["StationName", "locationName"])
                .with(Transform::Text),
            NormalizationRule::new(
                "region",
                &["GeoInfo.CountyName", "CountyName", "parameter.0.parameterValue"],
            )
            .with(Transform::Region),
            NormalizationRule::new("town", &["GeoInfo.TownName", "TownName", "parameter.2.parameterValue"])
                .with(Transform::Text),
            NormalizationRule::new("observed_at", &["ObsTime.DateTime", "time.obsTime", "DateTime"])
                .with(Transform::Timestamp),
            NormalizationRule::new("weather", &["WeatherElement.Weather", "Weather"])
                .with(Transform::Text),
            NormalizationRule::new(
                "temperature",
                &["WeatherElement.AirTemperature", "AirTemperature", "TEMP"],
            )
            .with(Transform::Number),
            NormalizationRule::new(
                "humidity",
                &["WeatherElement.RelativeHumidity", "RelativeHumidity", "HUMD"],
            )
            .with(Transform::Number),
            NormalizationRule::new(
                "precipitation",
                &["WeatherElement.Now.Precipitation", "Precipitation", "24R"],
            )
            .with(Transform::Number),
            NormalizationRule::new("wind_speed", &["WeatherElement.WindSpeed", "WindSpeed", "WDSD"])
                .with(Transform::Number),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::normalize::normalize;
    use serde_json::json;

    const REST: &str = r#"{
        "success": "true",
        "records": {"Station": [{
            "StationName": "淡水",
            "StationId": "466900",
            "ObsTime": {"DateTime": "2024-05-01T10:00:00+08:00"},
            "GeoInfo": {"CountyName": "新北市", "TownName": "淡水區"},
            "WeatherElement": {
                "Weather": "晴",
                "Now": {"Precipitation": 0.0},
                "WindSpeed": 2.3,
                "AirTemperature": 25.1,
                "RelativeHumidity": 71
            }
        }]}
    }"#;

    const BUCKET_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <cwaopendata><dataset><Station>
            <StationName>淡水</StationName>
            <StationId>466900</StationId>
            <ObsTime><DateTime>2024-05-01T10:00:00+08:00</DateTime></ObsTime>
            <GeoInfo><CountyName>新北市</CountyName><TownName>淡水區</TownName></GeoInfo>
            <WeatherElement>
                <Weather>晴</Weather>
                <Now><Precipitation>0.0</Precipitation></Now>
                <WindSpeed>2.3</WindSpeed>
                <AirTemperature>25.1</AirTemperature>
                <RelativeHumidity>71</RelativeHumidity>
            </WeatherElement>
        </Station></dataset></cwaopendata>"#;

    #[test]
    fn test_rest_and_xml_mirror_agree() {
        let rules = rules();
        let rest = normalize(&decode(REST.as_bytes(), PayloadFormat::JsonOrXml).unwrap(), &rules).unwrap();
        let xml = normalize(&decode(BUCKET_XML.as_bytes(), PayloadFormat::JsonOrXml).unwrap(), &rules)
            .unwrap();

        assert_eq!(rest, xml);
        assert_eq!(rest[0]["station_id"], json!("466900"));
        assert_eq!(rest[0]["temperature"], json!(25.1));
        assert_eq!(rest[0]["precipitation"], json!(0));
        assert_eq!(rest[0]["observed_at"], json!("2024-05-01T10:00:00+08:00"));
    }

    #[test]
    fn test_legacy_location_shape() {
        let legacy = json!({"records": {"location": [{
            "locationName": "臺北",
            "stationId": "466920",
            "time": {"obsTime": "2024-05-01 10:00:00"},
            "parameter": [
                {"parameterName": "CITY", "parameterValue": "台北市"},
                {"parameterName": "CITY_SN", "parameterValue": "01"},
                {"parameterName": "TOWN", "parameterValue": "中正區"}
            ]
        }]}});
        let records = normalize(&crate::decode::DecodedTree::new(legacy), &rules()).unwrap();

        assert_eq!(records[0]["region"], json!("臺北市"));
        assert_eq!(records[0]["town"], json!("中正區"));
        assert_eq!(records[0]["observed_at"], json!("2024-05-01T10:00:00+08:00"));
        assert_eq!(records[0]["temperature"], serde_json::Value::Null);
    }
}
