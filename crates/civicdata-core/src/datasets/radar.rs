//! Composite radar echo image. One record describing the latest frame.

use super::{DatasetDefinition, DatasetKind};
use crate::config::EndpointSpec;
use crate::decode::PayloadFormat;
use crate::normalize::{NormalizationRule, RuleSet, Transform};
use std::time::Duration;

pub(super) fn definition() -> DatasetDefinition {
    DatasetDefinition {
        kind: DatasetKind::Radar,
        format: PayloadFormat::JsonOrXml,
        ttl: Duration::from_secs(300),
        endpoints: vec![
            EndpointSpec::new("https://opendata.cwa.gov.tw/fileapi/v1/opendataapi/O-A0058-003")
                .with_query("format", "JSON")
                .requiring_credential(),
            EndpointSpec::new(
                "https://cwaopendata.s3.ap-northeast-1.amazonaws.com/Observation/O-A0058-003.json",
            ),
        ],
        rules: rules(),
    }
}

fn rules() -> RuleSet {
    RuleSet::new(
        &["cwaopendata.dataset", "cwaopendata", "records"],
        &["resource.ProductURL", "ProductURL", "resource.resourceURL"],
        vec![
            NormalizationRule::new(
                "image_url",
                &["resource.ProductURL", "ProductURL", "resource.resourceURL"],
            )
            .with(Transform::ResourceUrl {
                base: None,
                cache_bust: true,
            }),
            NormalizationRule::new(
                "observed_at",
                &["DateTime", "datasetInfo.parameterSet.DateTime", "dataTime"],
            )
            .with(Transform::Timestamp),
            NormalizationRule::new(
                "description",
                &["datasetInfo.datasetDescription", "resource.resourceDesc", "datasetDescription"],
            )
            .with(Transform::Text),
        ],
    )
}
