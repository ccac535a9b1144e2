//! Audio transport, PCM format and WAV file I/O

pub mod buffer;
#[cfg(feature = "audio-io")]
pub mod device;
pub mod format;
pub mod transport;
pub mod wav;

pub use buffer::FrameRingBuffer;
#[cfg(feature = "audio-io")]
pub use device::{
    list_input_devices, AudioDeviceInfo, CpalTransport, CpalTransportProvider,
    InputDevicePermission,
};
pub use format::AudioFormat;
pub use transport::{ProduceHandler, ReceiveHandler, StreamHandlers, Transport, TransportProvider};
pub use wav::{read_wav, write_wav, SampleSink, SampleSource};
