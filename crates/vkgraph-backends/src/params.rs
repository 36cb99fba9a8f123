//! Uniform parameter blocks passed to the built-in kernels
//!
//! Blocks are `#[repr(C)]` and padded to 16-byte multiples so they can be
//! uploaded as-is with [`bytemuck::bytes_of`].

use bytemuck::{Pod, Zeroable};

/// Dimensions of a rank <= 4 tensor, right-aligned into `[N, C, H, W]` with leading 1s.
pub type Sizes4 = [u32; 4];

/// Elementwise binary op with broadcasting: `out = op(in1, alpha * in2)` for add/sub,
/// `out = op(in1, in2)` otherwise.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BinaryParams {
    pub out_sizes: Sizes4,
    pub in1_sizes: Sizes4,
    pub in2_sizes: Sizes4,
    pub alpha: f32,
    pub _pad: [u32; 3],
}

impl BinaryParams {
    pub fn new(out_sizes: Sizes4, in1_sizes: Sizes4, in2_sizes: Sizes4, alpha: f32) -> Self {
        Self {
            out_sizes,
            in1_sizes,
            in2_sizes,
            alpha,
            _pad: [0; 3],
        }
    }

    pub fn numel(&self) -> usize {
        numel(&self.out_sizes)
    }
}

/// Elementwise unary op over `numel` elements
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UnaryParams {
    pub numel: u32,
    pub _pad: [u32; 3],
}

impl UnaryParams {
    pub fn new(numel: u32) -> Self {
        Self { numel, _pad: [0; 3] }
    }
}

/// `out = in + scalar` over `numel` elements
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ScalarParams {
    pub numel: u32,
    pub scalar: f32,
    pub _pad: [u32; 2],
}

impl ScalarParams {
    pub fn new(numel: u32, scalar: f32) -> Self {
        Self {
            numel,
            scalar,
            _pad: [0; 2],
        }
    }
}

/// Byte copy from binding 1 into binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CopyParams {
    pub num_bytes: u32,
    pub _pad: [u32; 3],
}

impl CopyParams {
    pub fn new(num_bytes: u32) -> Self {
        Self { num_bytes, _pad: [0; 3] }
    }
}

/// Product of the four dimensions
pub fn numel(sizes: &Sizes4) -> usize {
    sizes.iter().map(|&d| d as usize).product()
}

/// Map a linear index in `out` to the matching linear index in a broadcast input.
///
/// Input dimensions must each equal the output dimension or be 1.
pub fn broadcast_index(linear: usize, out: &Sizes4, input: &Sizes4) -> usize {
    let mut rem = linear;
    let mut coords = [0usize; 4];
    for dim in (0..4).rev() {
        let extent = out[dim].max(1) as usize;
        coords[dim] = rem % extent;
        rem /= extent;
    }
    coords
        .iter()
        .zip(input.iter())
        .fold(0, |idx, (&coord, &extent)| {
            let extent = extent.max(1) as usize;
            idx * extent + coord % extent
        })
}
