use std::rc::Rc;

use super::error::DeviceError;
use super::handle::GpuObject;
use super::Device;

/// Exclusive owner of a single device object.
///
/// Releases the object when dropped. Call [`release`](Self::release) to
/// observe the result instead.
pub struct Owned<H>
where
    H: Copy + Into<GpuObject>,
{
    handle: H,
    device: Rc<dyn Device>,
    live: bool,
}

impl<H> Owned<H>
where
    H: Copy + Into<GpuObject>,
{
    pub fn new(device: Rc<dyn Device>, handle: H) -> Self {
        Self {
            handle,
            device,
            live: true,
        }
    }

    #[inline]
    pub fn get(&self) -> H {
        self.handle
    }

    pub fn release(mut self) -> Result<(), DeviceError> {
        self.live = false;
        self.device.release(self.handle.into())
    }
}

impl<H> Drop for Owned<H>
where
    H: Copy + Into<GpuObject>,
{
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        let object = self.handle.into();
        if let Err(e) = self.device.release(object) {
            log::error!("failed to release {object} on drop: {e}");
        }
    }
}

impl<H> std::fmt::Debug for Owned<H>
where
    H: Copy + Into<GpuObject> + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owned")
            .field("handle", &self.handle)
            .field("live", &self.live)
            .finish()
    }
}

/// Ordered set of owned objects released last-in first-out.
///
/// Registries push every object right after creating it, so an early return
/// during init drops the set and releases whatever was already created.
pub struct OwnedSet {
    device: Rc<dyn Device>,
    objects: Vec<GpuObject>,
}

impl std::fmt::Debug for OwnedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedSet")
            .field("objects", &self.objects)
            .finish()
    }
}

impl OwnedSet {
    pub fn new(device: Rc<dyn Device>) -> Self {
        Self {
            device,
            objects: Vec::new(),
        }
    }

    pub fn device(&self) -> &Rc<dyn Device> {
        &self.device
    }

    /// Takes ownership of `handle` and hands it back for use.
    pub fn track<H>(&mut self, handle: H) -> H
    where
        H: Copy + Into<GpuObject>,
    {
        self.objects.push(handle.into());
        handle
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Releases everything in reverse creation order.
    ///
    /// Keeps going after a failure and returns the first error.
    pub fn release_all(&mut self) -> Result<(), DeviceError> {
        let mut first_err = None;
        while let Some(object) = self.objects.pop() {
            if let Err(e) = self.device.release(object) {
                log::error!("failed to release {object}: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for OwnedSet {
    fn drop(&mut self) {
        if self.objects.is_empty() {
            return;
        }
        log::debug!("releasing {} object(s) on drop", self.objects.len());
        // Errors are already logged per object.
        let _ = self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockDevice;
    use crate::backend::{BufferBinding, BufferDesc, BufferUsage, ShaderSource, Stage};
    use crate::vertex::{GpuVertex, Vertex};

    fn constant(device: &MockDevice, label: &str) -> crate::backend::BufferId {
        device
            .create_buffer(
                &BufferDesc {
                    label,
                    byte_width: 16,
                    usage: BufferUsage::Dynamic,
                    binding: BufferBinding::Constant,
                },
                None,
            )
            .unwrap()
    }

    #[test]
    fn owned_releases_on_drop() {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        {
            let _b = Owned::new(device.clone(), constant(&mock, "a"));
            assert_eq!(mock.live_count(), 1);
        }
        assert_eq!(mock.live_count(), 0);
        assert_eq!(mock.released_count(), 1);
    }

    #[test]
    fn explicit_release_does_not_double_free() {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        let b = Owned::new(device, constant(&mock, "a"));
        b.release().unwrap();
        assert_eq!(mock.released_count(), 1);
        assert_eq!(mock.live_count(), 0);
    }

    #[test]
    fn set_releases_in_reverse_order() {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        let mut set = OwnedSet::new(device);

        let vs = set.track(
            mock.create_shader(
                Stage::Vertex,
                &ShaderSource {
                    label: "vs",
                    wgsl: "fn vs_main() {}",
                    entry_point: "vs_main",
                },
            )
            .unwrap(),
        );
        set.track(
            mock.create_input_layout("layout", &[Vertex::FORMAT], vs)
                .unwrap(),
        );

        // The layout references the shader; reverse order releases it first.
        assert_eq!(set.release_all(), Ok(()));
        assert_eq!(mock.live_count(), 0);
        assert!(set.is_empty());
    }
}
