//! Test fixtures and data generators
//!
//! Client configuration goes through the same env loader the binary uses,
//! with a map standing in for the process environment.

use std::collections::HashMap;

use anyhow::Result;
use serde_json::{json, Value};
use shardgate_client::{Envelope, GatewayConfig, HeartbeatJitter};
use shardgate_common::ClientConfig;

pub const TEST_TOKEN: &str = "integration-token";

/// Heartbeat interval announced by the mock gateway
pub const HEARTBEAT_INTERVAL_MS: u64 = 400;

/// Environment for a client pointed at `url`, with fast timings
pub fn test_env(url: &str, shard_count: u32) -> HashMap<String, String> {
    [
        ("APP_NAME", "shardgate-it".to_string()),
        ("APP_ENV", "development".to_string()),
        ("GATEWAY_URL", url.to_string()),
        ("GATEWAY_TOKEN", TEST_TOKEN.to_string()),
        ("GATEWAY_INTENTS", "513".to_string()),
        ("GATEWAY_SHARD_COUNT", shard_count.to_string()),
        ("GATEWAY_IDENTIFY_INTERVAL_MS", "300".to_string()),
        ("GATEWAY_CONNECT_TIMEOUT_MS", "2000".to_string()),
        ("RECONNECT_INITIAL_DELAY_MS", "100".to_string()),
        ("RECONNECT_MAX_DELAY_MS", "400".to_string()),
        ("RECONNECT_JITTER", "0.0".to_string()),
        ("RECONNECT_ALERT_AFTER", "3".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Gateway configuration built from [`test_env`]
pub fn test_config(url: &str, shard_count: u32) -> Result<GatewayConfig> {
    config_from_env(&test_env(url, shard_count))
}

pub fn config_from_env(env: &HashMap<String, String>) -> Result<GatewayConfig> {
    let config = ClientConfig::from_lookup(|key| env.get(key).cloned())?;
    // First heartbeat at a predictable point
    Ok(GatewayConfig::from(&config).with_heartbeat_jitter(HeartbeatJitter::Fixed(0.25)))
}

pub fn ready(session_id: &str, resume_url: &str) -> Envelope {
    Envelope::dispatch(
        "READY",
        1,
        json!({
            "v": 10,
            "session_id": session_id,
            "resume_gateway_url": resume_url,
            "user": {"id": "1", "username": "shardgate"},
        }),
    )
}

pub fn message_create(seq: u64, content: &str) -> Envelope {
    Envelope::dispatch(
        "MESSAGE_CREATE",
        seq,
        json!({"id": seq.to_string(), "channel_id": "10", "content": content}),
    )
}

pub fn presence(status: &str) -> Value {
    json!({"since": null, "activities": [], "status": status, "afk": false})
}
