use crate::error::Error;

/// Common trait for consumers of raw Ethernet frames
pub trait FrameSink {
    /// Initialization function, call before feeding frames (optional)
    fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Callback function for every frame
    ///
    /// `frame` starts at the Ethernet header. The slice may be reused by the
    /// caller once this function returns.
    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error>;

    /// Teardown function, called after the last frame (optional)
    fn teardown(&mut self) {}
}
