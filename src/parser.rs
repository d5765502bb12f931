//! Protobuf decoding for GTFS Realtime feeds.

use prost::Message;
use tracing::{debug, info};

use crate::fetch::{FetchError, HttpClient, fetch_bytes};
use crate::gtfs_rt::{Alert, FeedEntity, FeedMessage, TripUpdate, VehiclePosition};

#[derive(thiserror::Error, Debug)]
pub enum RealtimeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid feed message: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns [`RealtimeError::Decode`] if the bytes are not valid protobuf for a
/// `FeedMessage`.
pub fn decode_feed(bytes: &[u8]) -> Result<FeedMessage, RealtimeError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Fetches and decodes one realtime feed. Every call goes back to the network.
#[tracing::instrument(skip(client))]
pub async fn fetch_feed<C: HttpClient>(client: &C, url: &str) -> Result<FeedMessage, RealtimeError> {
    let bytes = fetch_bytes(client, url).await?;
    let feed = decode_feed(&bytes)?;
    info!(
        bytes = bytes.len(),
        entities = feed.entity.len(),
        feed_timestamp = feed.header.timestamp(),
        "Realtime feed decoded"
    );
    Ok(feed)
}

/// The payload one feed entity carries.
#[derive(Debug, Clone, Copy)]
pub enum FeedPayload<'a> {
    Vehicle(&'a VehiclePosition),
    TripUpdate(&'a TripUpdate),
    Alert(&'a Alert),
    /// Deleted entities and entities with no recognised payload.
    Empty,
}

impl<'a> FeedPayload<'a> {
    pub fn of(entity: &'a FeedEntity) -> Self {
        let carried = [
            entity.vehicle.is_some(),
            entity.trip_update.is_some(),
            entity.alert.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if carried > 1 {
            debug!(entity_id = %entity.id, carried, "Entity carries more than one payload");
        }

        if let Some(v) = &entity.vehicle {
            Self::Vehicle(v)
        } else if let Some(tu) = &entity.trip_update {
            Self::TripUpdate(tu)
        } else if let Some(a) = &entity.alert {
            Self::Alert(a)
        } else {
            Self::Empty
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Vehicle(_) => "vehicle",
            Self::TripUpdate(_) => "trip_update",
            Self::Alert(_) => "alert",
            Self::Empty => "empty",
        }
    }
}

/// Tags every entity of `feed` with its payload, in feed order.
pub fn payloads(feed: &FeedMessage) -> impl Iterator<Item = (&FeedEntity, FeedPayload<'_>)> {
    feed.entity.iter().map(|e| (e, FeedPayload::of(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use crate::gtfs_rt::{FeedHeader, TripDescriptor};
    use std::time::Duration;

    fn header() -> FeedHeader {
        FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(1234567890),
            incrementality: None,
            feed_version: None,
        }
    }

    #[test]
    fn test_decode_empty_bytes_returns_default_feed() {
        // An empty byte array decodes to a FeedMessage with default values
        let feed = decode_feed(&[]).unwrap();
        assert_eq!(feed.header.gtfs_realtime_version, "");
        assert!(feed.entity.is_empty());
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result = decode_feed(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(RealtimeError::Decode(_))));
    }

    #[test]
    fn test_decode_valid_minimal_feed() {
        let feed = FeedMessage {
            header: header(),
            entity: vec![],
        };
        let parsed = decode_feed(&feed.encode_to_vec()).unwrap();

        assert_eq!(parsed.header.gtfs_realtime_version, "2.0");
        assert_eq!(parsed.header.timestamp, Some(1234567890));
    }

    #[test]
    fn test_payloads_tag_each_entity_in_order() {
        let feed = FeedMessage {
            header: header(),
            entity: vec![
                FeedEntity {
                    id: "v1".to_string(),
                    vehicle: Some(VehiclePosition::default()),
                    ..Default::default()
                },
                FeedEntity {
                    id: "t1".to_string(),
                    trip_update: Some(TripUpdate {
                        trip: TripDescriptor::default(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                FeedEntity {
                    id: "a1".to_string(),
                    alert: Some(Alert::default()),
                    ..Default::default()
                },
                FeedEntity {
                    id: "d1".to_string(),
                    is_deleted: Some(true),
                    ..Default::default()
                },
            ],
        };

        let kinds: Vec<(&str, &str)> = payloads(&feed)
            .map(|(e, p)| (e.id.as_str(), p.kind()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("v1", "vehicle"),
                ("t1", "trip_update"),
                ("a1", "alert"),
                ("d1", "empty"),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_feed_transport_failure() {
        let client = BasicClient::new(Duration::from_secs(2)).unwrap();
        let err = fetch_feed(&client, "http://127.0.0.1:1/vehiclepositions.pb")
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Fetch(FetchError::Transport { .. })));
    }
}
