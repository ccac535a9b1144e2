//! Callback-driven audio transport contract
//!
//! A transport delivers captured frames to a [`ReceiveHandler`] and pulls
//! frames to render from a [`ProduceHandler`], both on real-time callback
//! contexts. Handlers are owned by the transport from `start` until `stop`.

use crate::audio::AudioFormat;
use crate::Result;

/// Consumes captured frames on the capture callback
pub trait ReceiveHandler: Send {
    fn on_receive(&mut self, input: &[i16]);
}

/// Fills frames to render on the render callback
pub trait ProduceHandler: Send {
    fn on_produce(&mut self, output: &mut [i16]);
}

/// Handlers to install when a transport is activated
///
/// Capture is enabled iff `receive` is set, render iff `produce` is set.
#[derive(Default)]
pub struct StreamHandlers {
    pub receive: Option<Box<dyn ReceiveHandler>>,
    pub produce: Option<Box<dyn ProduceHandler>>,
}

impl StreamHandlers {
    /// Simultaneous capture and render
    pub fn duplex(receive: Box<dyn ReceiveHandler>, produce: Box<dyn ProduceHandler>) -> Self {
        Self {
            receive: Some(receive),
            produce: Some(produce),
        }
    }

    /// Render only
    pub fn render_only(produce: Box<dyn ProduceHandler>) -> Self {
        Self {
            receive: None,
            produce: Some(produce),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receive.is_none() && self.produce.is_none()
    }
}

/// An audio I/O device bound to a fixed format
pub trait Transport {
    /// Activate capture and/or render with the given handlers
    ///
    /// Starting an already active transport, or starting with no handlers,
    /// is a no-op.
    fn start(&mut self, handlers: StreamHandlers) -> Result<()>;

    /// Deactivate and drop the installed handlers
    fn stop(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;

    fn format(&self) -> AudioFormat;
}

/// Opens transports on the control context
///
/// Transports may hold platform streams that cannot leave the thread that
/// created them, so only the provider has to be `Send`.
pub trait TransportProvider: Send {
    fn open(&self, format: AudioFormat) -> Result<Box<dyn Transport>>;
}
