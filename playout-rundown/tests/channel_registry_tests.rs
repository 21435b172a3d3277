//! Channel Registry Tests
//!
//! Configuration-driven channel setup and reconfiguration.

use playout_common::config::{ChannelConfig, TomlConfig};
use playout_rundown::channel::DeviceFactory;
use playout_rundown::testing::RecordingDevice;
use playout_rundown::{ChannelRegistry, ChannelUpdate, MediaFile, PlaybackDevice};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn recording_devices() -> impl DeviceFactory {
    |_: &ChannelConfig| -> Arc<dyn PlaybackDevice> { RecordingDevice::new() }
}

#[tokio::test]
async fn test_channels_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "debug"

[[channels]]
name = "studio"
preload_lead_ms = 1500
disable_after_unload = true

[[channels]]
name = "promo"
looping = true
add_items_with_autoplay = true
"#
    )
    .unwrap();

    let config = TomlConfig::load(file.path()).unwrap();
    let mut registry = ChannelRegistry::from_config(&config, recording_devices()).await;

    assert_eq!(registry.channel_names(), vec!["promo", "studio"]);
    let studio = registry.channel("studio").unwrap().settings().await;
    assert_eq!(studio.preload_lead, Duration::from_millis(1_500));
    assert!(studio.disable_after_unload);
    let promo = registry.channel("promo").unwrap();
    assert!(promo.is_looping().await);
    assert!(promo.add_items_with_autoplay().await);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_reconfigure_keeps_rundown() {
    let mut registry = ChannelRegistry::new(recording_devices());
    registry
        .update_channels(vec![ChannelUpdate::new(ChannelConfig::named("main"))])
        .await;
    let main = registry.channel("main").unwrap();
    let item = main
        .add_file_item(MediaFile::new("/media/a.mxf", Duration::from_secs(5)), 0)
        .await
        .unwrap();
    main.load(item.id()).await.unwrap();

    let mut looping = ChannelConfig::named("main");
    looping.looping = true;
    registry.update_channels(vec![ChannelUpdate::new(looping)]).await;

    assert!(main.is_looping().await);
    assert_eq!(main.len().await, 1);
    assert_eq!(main.playing_item().await.unwrap().id(), item.id());

    registry.shutdown().await;
    assert!(main.is_empty().await);
    assert!(!item.is_prepared());
}

#[tokio::test]
async fn test_removed_channel_released() {
    let mut registry = ChannelRegistry::new(recording_devices());
    registry
        .update_channels(vec![
            ChannelUpdate::new(ChannelConfig::named("one")),
            ChannelUpdate::new(ChannelConfig::named("two")),
        ])
        .await;
    let two = registry.channel("two").unwrap();
    let item = two
        .add_file_item(MediaFile::new("/media/b.mxf", Duration::from_secs(5)), 0)
        .await
        .unwrap();
    two.load(item.id()).await.unwrap();

    registry
        .update_channels(vec![ChannelUpdate::new(ChannelConfig::named("one"))])
        .await;

    assert_eq!(registry.channel_names(), vec!["one"]);
    assert!(registry.channel("two").is_err());
    assert!(!item.is_prepared());
    assert!(!two.is_running());
}
