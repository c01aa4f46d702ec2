//! GStreamer pipeline setup and configuration
//!
//! Each movie is a `playbin` whose video sink is a small bin converting
//! decoded frames to RGBA and handing them to an `AppSink`.

use super::frames::FrameSink;
use anyhow::{Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;
use std::time::Duration;

/// Video sink: anything playbin decodes becomes tightly specified RGBA
const VIDEO_SINK_DESCRIPTION: &str = "videoconvert ! video/x-raw,format=RGBA ! appsink name=sink";

/// Initialize GStreamer (idempotent, safe to call multiple times)
pub fn initialize_gstreamer() -> Result<()> {
    static GSTREAMER_INITIALIZED: std::sync::Once = std::sync::Once::new();

    gst::init().context("Failed to initialize GStreamer")?;
    GSTREAMER_INITIALIZED.call_once(|| {
        let (major, minor, micro, _) = gst::version();
        log::info!("GStreamer {}.{}.{} initialized", major, minor, micro);
    });
    Ok(())
}

/// Build a playbin for `uri` with an RGBA app sink
///
/// # Returns
///
/// Tuple of (playbin, app_sink) where app_sink receives decoded frames
pub fn build_playbin(uri: &str) -> Result<(gst::Element, gst_app::AppSink)> {
    log::info!("Creating GStreamer pipeline for: {}", uri);
    log::debug!("GStreamer video sink: {}", VIDEO_SINK_DESCRIPTION);

    let sink_bin = gst::parse::bin_from_description(VIDEO_SINK_DESCRIPTION, true)
        .context("Failed to create video sink bin")?;

    // Get the appsink element
    let app_sink = sink_bin
        .by_name("sink")
        .context("Failed to get appsink from sink bin")?
        .dynamic_cast::<gst_app::AppSink>()
        .map_err(|_| anyhow::anyhow!("sink is not an AppSink"))?;

    let playbin = gst::ElementFactory::make("playbin")
        .property("uri", uri)
        .property("video-sink", sink_bin.upcast_ref::<gst::Element>())
        .build()
        .context("Failed to create playbin")?;

    Ok((playbin, app_sink))
}

/// Configure AppSink for low-latency frame delivery
///
/// - `sync=true`: Proper frame pacing (respects video timestamps)
/// - `max-buffers=1`: Minimal latency
/// - `drop=true`: Let GStreamer drop old frames if queue fills
pub fn configure_app_sink(app_sink: &gst_app::AppSink) {
    app_sink.set_property("sync", true);
    app_sink.set_property("max-buffers", 1u32);
    app_sink.set_property("drop", true);
}

/// Setup frame callback for AppSink
///
/// Every decoded frame is copied, row by row, into the sink's target buffer
pub fn setup_frame_callback(app_sink: &gst_app::AppSink, frames: FrameSink) {
    app_sink.set_callbacks(
        gst_app::AppSinkCallbacks::builder()
            .new_sample(move |sink| {
                let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                let info = gst_video::VideoInfo::from_caps(caps).map_err(|_| gst::FlowError::Error)?;

                let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
                    .map_err(|_| gst::FlowError::Error)?;
                let stride = frame.plane_stride()[0].max(0) as usize;
                let data = frame.plane_data(0).map_err(|_| gst::FlowError::Error)?;

                frames.deliver(data, stride);
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

/// Detach the frame callback so no more frames arrive
pub fn clear_frame_callback(app_sink: &gst_app::AppSink) {
    app_sink.set_callbacks(gst_app::AppSinkCallbacks::builder().build());
}

/// Pause the pipeline and wait, at most `timeout`, for the first frame
pub fn preroll(playbin: &gst::Element, timeout: Duration) -> Result<()> {
    playbin
        .set_state(gst::State::Paused)
        .map_err(|_| anyhow::anyhow!("{}", first_error(playbin)))
        .context("Failed to set pipeline to Paused state")?;

    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    let (result, current, pending) = playbin.state(Some(gst::ClockTime::from_mseconds(timeout_ms)));
    match result {
        Ok(gst::StateChangeSuccess::Async) => {
            log::warn!(
                "Pipeline still prerolling after {:?} (current={:?}, pending={:?})",
                timeout,
                current,
                pending
            );
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(_) => anyhow::bail!("Pipeline failed to preroll: {}", first_error(playbin)),
    }
}

/// Stop the pipeline and drop whatever is left on its bus
pub fn shutdown(playbin: &gst::Element) {
    match playbin.set_state(gst::State::Null) {
        Ok(state_change) => log::debug!("Pipeline state change result: {:?}", state_change),
        Err(e) => log::warn!("Failed to set pipeline state to Null: {}", e),
    }

    // Drain pending messages from bus
    if let Some(bus) = playbin.bus() {
        let mut drained = 0;
        while bus.pop().is_some() {
            drained += 1;
        }
        if drained > 0 {
            log::debug!("Drained {} pending messages from bus", drained);
        }
    }
}

/// Text of the first error posted on the bus
fn first_error(playbin: &gst::Element) -> String {
    playbin
        .bus()
        .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]))
        .and_then(|msg| match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "unknown error".to_string())
}

fn negotiated_info(app_sink: &gst_app::AppSink) -> Option<gst_video::VideoInfo> {
    let caps = app_sink.static_pad("sink")?.current_caps()?;
    gst_video::VideoInfo::from_caps(&caps).ok()
}

/// Frame size negotiated on the app sink, once prerolled
pub fn detect_video_size(app_sink: &gst_app::AppSink) -> Option<(u32, u32)> {
    let info = negotiated_info(app_sink)?;
    Some((info.width(), info.height()))
}

/// Detect video FPS from the negotiated caps
pub fn detect_fps(app_sink: &gst_app::AppSink) -> Option<f64> {
    let framerate = negotiated_info(app_sink)?.fps();
    if framerate.numer() > 0 && framerate.denom() > 0 {
        let fps = framerate.numer() as f64 / framerate.denom() as f64;
        log::info!("Detected video FPS: {:.2}", fps);
        Some(fps)
    } else {
        None
    }
}
