//! Reservoir water levels and storage.

use super::{DatasetDefinition, DatasetKind};
use crate::config::EndpointSpec;
use crate::decode::PayloadFormat;
use crate::network::TlsMode;
use crate::normalize::{NormalizationRule, RuleSet, Transform};
use std::time::Duration;

pub(super) fn definition() -> DatasetDefinition {
    DatasetDefinition {
        kind: DatasetKind::Reservoir,
        format: PayloadFormat::Json,
        ttl: Duration::from_secs(1800),
        endpoints: vec![
            EndpointSpec::new("https://data.wra.gov.tw/Service/OpenData.aspx")
                .with_query("format", "json")
                .with_query("id", "1602CA19-B224-4CC3-AA31-11B1B124530F"),
            // Mirror serves an incomplete certificate chain.
            EndpointSpec::new("https://fhy.wra.gov.tw/WraApi/v1/Reservoir/RealTimeInfo")
                .with_tls_mode(TlsMode::Relaxed),
        ],
        rules: rules(),
    }
}

fn rules() -> RuleSet {
    RuleSet::new(
        &["ReservoirConditionData_OPENDATA", "Data", "data", "responseData"],
        &["ReservoirIdentifier", "StationNo", "ReservoirName"],
        vec![
            NormalizationRule::new("reservoir_id", &["ReservoirIdentifier", "StationNo"])
                .with(Transform::Text),
            NormalizationRule::new("reservoir_name", &["ReservoirName", "StationName"])
                .with(Transform::Text),
            NormalizationRule::new("observed_at", &["ObservationTime", "Time", "RecordTime"])
                .with(Transform::Timestamp),
            NormalizationRule::new("water_level", &["WaterLevel", "CurrentWaterLevel"])
                .with(Transform::Number),
            NormalizationRule::new(
                "effective_storage",
                &["EffectiveWaterStorageCapacity", "EffectiveStorage"],
            )
            .with(Transform::Number),
            NormalizationRule::new("storage_percent", &["PercentageOfStorage", "Percentage"])
                .with(Transform::Percentage),
        ],
    )
}
