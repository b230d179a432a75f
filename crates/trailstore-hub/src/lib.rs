// ABOUTME: Live track data hub that resamples the selected track for display listeners.
// ABOUTME: Runs as an actor on its own thread and reacts to store change notifications.

pub mod hub;
pub mod listener;
pub mod sampling;

pub use hub::{
    HubConfig, HubError, HubSnapshot, RecordingStatus, TrackDataHubHandle, spawn,
};
pub use listener::{ListenerId, TrackDataListener};
