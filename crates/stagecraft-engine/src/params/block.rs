use std::rc::Rc;

use bytemuck::Pod;

use crate::backend::{
    BufferBinding, BufferDesc, BufferId, BufferUsage, CommandContext, Device, DeviceError, Owned,
};

/// Constant buffers are sized in multiples of this many bytes.
pub const CONSTANT_ALIGNMENT: u64 = 16;

/// `size` rounded up to [`CONSTANT_ALIGNMENT`], never zero.
pub const fn aligned_size(size: usize) -> u64 {
    let size = size as u64;
    let rounded = size.div_ceil(CONSTANT_ALIGNMENT) * CONSTANT_ALIGNMENT;
    if rounded == 0 { CONSTANT_ALIGNMENT } else { rounded }
}

/// When [`ParameterBlock::apply_changes`] uploads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UploadPolicy {
    /// Upload only after the CPU struct was mutated.
    OnChange,
    /// Also upload on the first apply of every frame, mutated or not.
    EveryFrame,
}

/// Proof that a block's GPU copy is current for the frame it was applied in.
///
/// Only [`ParameterBlock::apply_changes`] produces one, and stage bindings
/// accept nothing else, so a block cannot be bound before it is applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AppliedBlock {
    buffer: BufferId,
    frame: u64,
}

impl AppliedBlock {
    #[inline]
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// A typed CPU struct mirrored into a dynamic constant buffer.
pub struct ParameterBlock<T: Pod> {
    label: String,
    data: T,
    buffer: Owned<BufferId>,
    byte_size: u64,
    dirty: bool,
    policy: UploadPolicy,
    last_upload: Option<u64>,
    /// `CommandContext::discarded_frames` when the last upload was recorded.
    upload_epoch: u64,
}

impl<T: Pod> ParameterBlock<T> {
    /// Allocates the GPU buffer. The first `apply_changes` always uploads.
    pub fn initialize(
        device: &Rc<dyn Device>,
        label: &str,
        initial: T,
        policy: UploadPolicy,
    ) -> Result<Self, DeviceError> {
        let byte_size = aligned_size(std::mem::size_of::<T>());
        let buffer = device.create_buffer(
            &BufferDesc {
                label,
                byte_width: byte_size,
                usage: BufferUsage::Dynamic,
                binding: BufferBinding::Constant,
            },
            None,
        )?;

        log::debug!("parameter block `{label}`: {byte_size} bytes, {policy:?}");

        Ok(Self {
            label: label.to_string(),
            data: initial,
            buffer: Owned::new(device.clone(), buffer),
            byte_size,
            dirty: true,
            policy,
            last_upload: None,
            upload_epoch: 0,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable access; marks the block dirty.
    pub fn data_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.data
    }

    pub fn set(&mut self, value: T) {
        self.data = value;
        self.dirty = true;
    }

    /// Stores `value` only if it differs bytewise from the current struct.
    /// Returns whether the block became dirty.
    pub fn update(&mut self, value: T) -> bool {
        if bytemuck::bytes_of(&self.data) == bytemuck::bytes_of(&value) {
            return false;
        }
        self.set(value);
        true
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn policy(&self) -> UploadPolicy {
        self.policy
    }

    /// Size of the GPU buffer in bytes.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// The underlying buffer, for inspection. Bind through `apply_changes`.
    pub fn buffer_id(&self) -> BufferId {
        self.buffer.get()
    }

    /// Uploads the CPU struct if it changed (or per policy) and returns the
    /// bindable token. Calling it again without a mutation is a no-op.
    ///
    /// A frame discarded since the last upload may have carried that upload,
    /// so the block uploads again.
    pub fn apply_changes(
        &mut self,
        ctx: &mut dyn CommandContext,
    ) -> Result<AppliedBlock, DeviceError> {
        let frame = ctx.frame_index();
        let discarded = ctx.discarded_frames();
        if self.last_upload.is_some() && discarded != self.upload_epoch {
            log::trace!("`{}` re-uploads after a discarded frame", self.label);
            self.dirty = true;
        }

        let due = self.dirty
            || (self.policy == UploadPolicy::EveryFrame && self.last_upload != Some(frame));

        if due {
            let mut bytes = vec![0u8; self.byte_size as usize];
            let src = bytemuck::bytes_of(&self.data);
            bytes[..src.len()].copy_from_slice(src);

            ctx.update_buffer(self.buffer.get(), &bytes)?;
            self.dirty = false;
            self.last_upload = Some(frame);
            self.upload_epoch = discarded;
            log::trace!("uploaded `{}` for frame {frame}", self.label);
        }

        Ok(AppliedBlock {
            buffer: self.buffer.get(),
            frame,
        })
    }

    /// Releases the GPU buffer and reports the outcome.
    pub fn destroy(self) -> Result<(), DeviceError> {
        self.buffer.release()
    }
}

/// Type-erased parameter block, as referenced by a stage binding.
pub trait StageBlock {
    fn label(&self) -> &str;

    fn apply(&mut self, ctx: &mut dyn CommandContext) -> Result<AppliedBlock, DeviceError>;
}

impl<T: Pod> StageBlock for ParameterBlock<T> {
    fn label(&self) -> &str {
        &self.label
    }

    fn apply(&mut self, ctx: &mut dyn CommandContext) -> Result<AppliedBlock, DeviceError> {
        self.apply_changes(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{Command, MockContext, MockDevice};
    use crate::backend::ResultCode;
    use bytemuck::Zeroable;

    #[repr(C)]
    #[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Odd {
        a: [f32; 3],
        b: f32,
        c: f32,
    }

    fn setup() -> (Rc<MockDevice>, Rc<dyn Device>) {
        let mock = Rc::new(MockDevice::new());
        let device: Rc<dyn Device> = mock.clone();
        (mock, device)
    }

    // ── sizing ──────────────────────────────────────────────────────────────

    #[test]
    fn aligned_size_rounds_up() {
        assert_eq!(aligned_size(0), 16);
        assert_eq!(aligned_size(1), 16);
        assert_eq!(aligned_size(16), 16);
        assert_eq!(aligned_size(20), 32);
        assert_eq!(aligned_size(272), 272);
    }

    #[test]
    fn gpu_buffer_is_struct_size_rounded_to_16() {
        let (mock, device) = setup();
        let block =
            ParameterBlock::initialize(&device, "odd", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        assert_eq!(std::mem::size_of::<Odd>(), 20);
        assert_eq!(block.byte_size(), 32);
        assert_eq!(mock.buffer_size(block.buffer_id()), Some(32));
        assert_eq!(
            mock.buffer_usage(block.buffer_id()),
            Some((BufferUsage::Dynamic, BufferBinding::Constant))
        );
    }

    // ── apply ───────────────────────────────────────────────────────────────

    #[test]
    fn apply_is_idempotent() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "odd", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        let mut ctx = MockContext::new(&mock);

        block.data_mut().b = 4.0;
        let first = block.apply_changes(&mut ctx).unwrap();
        let after_first = mock.buffer_contents(block.buffer_id()).unwrap();

        let second = block.apply_changes(&mut ctx).unwrap();
        let after_second = mock.buffer_contents(block.buffer_id()).unwrap();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
        assert_eq!(ctx.upload_count(block.buffer_id()), 1);
        assert_eq!(&after_first[12..16], &4.0f32.to_ne_bytes());
    }

    #[test]
    fn every_frame_policy_uploads_once_per_frame() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "eye", Odd::zeroed(), UploadPolicy::EveryFrame)
                .unwrap();
        let mut ctx = MockContext::new(&mock);

        block.apply_changes(&mut ctx).unwrap();
        block.apply_changes(&mut ctx).unwrap();
        assert_eq!(ctx.upload_count(block.buffer_id()), 1);

        ctx.next_frame();
        let applied = block.apply_changes(&mut ctx).unwrap();
        assert_eq!(applied.frame(), 1);
        assert_eq!(ctx.upload_count(block.buffer_id()), 2);
    }

    #[test]
    fn mutation_between_applies_reuploads_within_a_frame() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "object", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        let mut ctx = MockContext::new(&mock);

        block.set(Odd { a: [1.0; 3], b: 0.0, c: 0.0 });
        block.apply_changes(&mut ctx).unwrap();
        block.set(Odd { a: [2.0; 3], b: 0.0, c: 0.0 });
        block.apply_changes(&mut ctx).unwrap();

        let uploads: Vec<_> = ctx
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::UpdateBuffer { bytes, .. } => Some(bytes[0..4].to_vec()),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![1.0f32.to_ne_bytes().to_vec(), 2.0f32.to_ne_bytes().to_vec()]);
    }

    #[test]
    fn failed_upload_stays_dirty() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "object", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        let mut ctx = MockContext::new(&mock);

        mock.fail_next("update_buffer", ResultCode::DeviceLost);
        let err = block.apply_changes(&mut ctx).unwrap_err();
        assert_eq!(err.code(), Some(ResultCode::DeviceLost));
        assert!(block.is_dirty());

        block.apply_changes(&mut ctx).unwrap();
        assert!(!block.is_dirty());
    }

    #[test]
    fn discarded_frame_uploads_again() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "object", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        let mut ctx = MockContext::new(&mock);

        block.set(Odd { a: [3.0; 3], b: 0.0, c: 0.0 });
        block.apply_changes(&mut ctx).unwrap();
        assert_eq!(ctx.discard(), 1);

        ctx.next_frame();
        block.apply_changes(&mut ctx).unwrap();
        assert_eq!(ctx.upload_count(block.buffer_id()), 1);
        assert!(!block.is_dirty());

        // Submitted this time, so the next frame has nothing to upload.
        ctx.take_commands();
        ctx.next_frame();
        block.apply_changes(&mut ctx).unwrap();
        assert_eq!(ctx.upload_count(block.buffer_id()), 0);
    }

    #[test]
    fn discard_before_the_first_upload_changes_nothing() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "object", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        let mut ctx = MockContext::new(&mock);
        ctx.discard();

        ctx.next_frame();
        block.apply_changes(&mut ctx).unwrap();
        block.apply_changes(&mut ctx).unwrap();
        assert_eq!(ctx.upload_count(block.buffer_id()), 1);
    }

    #[test]
    fn unchanged_update_does_not_dirty() {
        let (mock, device) = setup();
        let mut block =
            ParameterBlock::initialize(&device, "odd", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        let mut ctx = MockContext::new(&mock);
        block.apply_changes(&mut ctx).unwrap();

        assert!(!block.update(Odd::zeroed()));
        assert!(!block.is_dirty());
        assert!(block.update(Odd { a: [0.0; 3], b: 1.0, c: 0.0 }));
        assert!(block.is_dirty());
    }

    #[test]
    fn destroy_releases_the_buffer() {
        let (mock, device) = setup();
        let block =
            ParameterBlock::initialize(&device, "odd", Odd::zeroed(), UploadPolicy::OnChange)
                .unwrap();
        assert_eq!(mock.live_count(), 1);
        block.destroy().unwrap();
        assert_eq!(mock.live_count(), 0);
    }
}
