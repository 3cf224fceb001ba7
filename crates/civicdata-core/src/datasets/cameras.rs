//! Freeway traffic cameras.
//!
//! The XML feed only carries image paths relative to its own host, and the
//! host refuses clients that do not look like a browser.

use super::{DatasetDefinition, DatasetKind};
use crate::config::EndpointSpec;
use crate::decode::PayloadFormat;
use crate::network::TlsMode;
use crate::normalize::{NormalizationRule, RuleSet, Transform};
use std::time::Duration;
use url::Url;

const IMAGE_HOST: &str = "https://cctv.bote.gov.taipei";

pub(super) fn definition() -> DatasetDefinition {
    DatasetDefinition {
        kind: DatasetKind::Cameras,
        format: PayloadFormat::JsonOrXml,
        ttl: Duration::from_secs(3600),
        endpoints: vec![
            EndpointSpec::new("https://tdx.transportdata.tw/api/basic/v2/Road/Traffic/CCTV/Freeway")
                .with_query("$format", "JSON"),
            EndpointSpec::new("https://tisvcloud.freeway.gov.tw/history/motc20/CCTV.xml")
                .with_tls_mode(TlsMode::Relaxed)
                .with_browser_user_agent(),
        ],
        rules: rules(Url::parse(IMAGE_HOST).ok()),
    }
}

fn rules(image_base: Option<Url>) -> RuleSet {
    RuleSet::new(
        &["CCTVs", "CCTVList.CCTVs.CCTV", "CCTVList.CCTV", "data"],
        &["CCTVID", "CCTVId", "cctvid"],
        vec![
            NormalizationRule::new("camera_id", &["CCTVID", "CCTVId", "cctvid"]).with(Transform::Text),
            NormalizationRule::new("name", &["RoadName", "LocationName", "Name"]).with(Transform::Text),
            NormalizationRule::new("region", &["County", "CountyName", "City"]).with(Transform::Region),
            NormalizationRule::new("road", &["RoadSection.Start", "RoadID", "RoadName"])
                .with(Transform::Text),
            NormalizationRule::new("image_url", &["ImageURL", "SnapshotURL", "ImagePath"]).with(
                Transform::ResourceUrl {
                    base: image_base.clone(),
                    cache_bust: true,
                },
            ),
            NormalizationRule::new("stream_url", &["VideoStreamURL", "VideoURL", "StreamURL"]).with(
                Transform::ResourceUrl {
                    base: image_base,
                    cache_bust: false,
                },
            ),
            NormalizationRule::new("latitude", &["PositionLat", "Latitude", "Lat"])
                .with(Transform::Number),
            NormalizationRule::new("longitude", &["PositionLon", "Longitude", "Lon"])
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

    fn host_rules() -> RuleSet {
        rules(Url::parse("https://host").ok())
    }

    #[test]
    fn test_relative_image_gets_base_and_stamp() {
        let xml = r#"<CCTVList><CCTVs><CCTV>
            <CCTVID>CCTV-N1-N-25.000-M</CCTVID>
            <RoadName>國道1號</RoadName>
            <County>台北市</County>
            <ImagePath>/images/cam1.jpg</ImagePath>
            <VideoStreamURL>//stream.example/live/1</VideoStreamURL>
            <PositionLat>25.04</PositionLat>
            <PositionLon>121.51</PositionLon>
        </CCTV></CCTVs></CCTVList>"#;

        let records = normalize(&decode(xml.as_bytes(), PayloadFormat::JsonOrXml).unwrap(), &host_rules()).unwrap();
        assert_eq!(records.len(), 1);
        let cam = &records[0];
        assert_eq!(cam["region"], json!("臺北市"));
        assert_eq!(cam["stream_url"], json!("https://stream.example/live/1"));
        assert_eq!(cam["latitude"], json!(25.04));
        assert!(cam["image_url"]
            .as_str()
            .unwrap()
            .starts_with("https://host/images/cam1.jpg?_t="));
    }

    #[test]
    fn test_json_and_xml_key_sets_match() {
        let json_body = r#"{"CCTVs": [{
            "CCTVID": "C1", "RoadName": "國道3號", "ImageURL": "https://img.example/c1.jpg",
            "PositionLat": 24.1, "PositionLon": 120.6
        }]}"#;
        let xml_body = r#"<CCTVList><CCTVs><CCTV><CCTVID>C1</CCTVID></CCTV><CCTV><CCTVID>C2</CCTVID></CCTV></CCTVs></CCTVList>"#;

        let rules = host_rules();
        let a = normalize(&decode(json_body.as_bytes(), PayloadFormat::JsonOrXml).unwrap(), &rules).unwrap();
        let b = normalize(&decode(xml_body.as_bytes(), PayloadFormat::JsonOrXml).unwrap(), &rules).unwrap();
        assert_eq!(b.len(), 2);

        let keys_a: Vec<_> = a[0].keys().collect();
        let keys_b: Vec<_> = b[0].keys().collect();
        assert_eq!(keys_a, keys_b);
        assert_eq!(b[0]["image_url"], serde_json::Value::Null);
    }
}
