use std::fmt;

/// Scalar/vector type of one vertex attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl ElementFormat {
    pub const fn size(self) -> u32 {
        match self {
            ElementFormat::Float32 => 4,
            ElementFormat::Float32x2 => 8,
            ElementFormat::Float32x3 => 12,
            ElementFormat::Float32x4 => 16,
        }
    }
}

/// Whether a buffer slot advances per vertex or per instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StepMode {
    Vertex,
    Instance,
}

/// One attribute inside a vertex.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VertexElement {
    /// Semantic name the vertex stage declares (`POSITION`, `NORMAL`, ...).
    pub semantic: &'static str,
    pub semantic_index: u32,
    pub format: ElementFormat,
    /// Byte offset from the start of the vertex.
    pub offset: u32,
    /// Shader input location.
    pub location: u32,
}

/// Byte layout of one vertex buffer slot.
///
/// A single `&'static VertexFormat` is referenced by both the shader registry
/// (to build the input layout) and the geometry registry (to record the stride
/// of every mesh), so the two sides can be compared at init.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    pub name: &'static str,
    pub stride: u32,
    pub step: StepMode,
    pub elements: &'static [VertexElement],
}

impl VertexFormat {
    /// Checks that every element fits in `stride` and no two elements overlap.
    pub fn validate(&self) -> Result<(), VertexFormatError> {
        if self.elements.is_empty() {
            return Err(VertexFormatError::Empty { format: self.name });
        }

        for (i, e) in self.elements.iter().enumerate() {
            let end = e.offset + e.format.size();
            if end > self.stride {
                return Err(VertexFormatError::OutOfStride {
                    format: self.name,
                    semantic: e.semantic,
                    end,
                    stride: self.stride,
                });
            }

            for other in &self.elements[i + 1..] {
                let other_end = other.offset + other.format.size();
                if e.offset < other_end && other.offset < end {
                    return Err(VertexFormatError::Overlap {
                        format: self.name,
                        first: e.semantic,
                        second: other.semantic,
                    });
                }
                if e.location == other.location {
                    return Err(VertexFormatError::DuplicateLocation {
                        format: self.name,
                        location: e.location,
                    });
                }
            }
        }

        Ok(())
    }

    /// Like [`validate`](Self::validate), and also checks the stride against
    /// the Rust type that fills the buffer.
    pub fn validate_for<V: GpuVertex>(&self) -> Result<(), VertexFormatError> {
        self.validate()?;
        let size = std::mem::size_of::<V>() as u32;
        if size != self.stride {
            return Err(VertexFormatError::StrideMismatch {
                format: self.name,
                stride: self.stride,
                type_size: size,
            });
        }
        Ok(())
    }
}

impl fmt::Display for VertexFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (stride {})", self.name, self.stride)
    }
}

/// A plain-old-data vertex type with a declared buffer layout.
pub trait GpuVertex: bytemuck::Pod {
    const FORMAT: &'static VertexFormat;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VertexFormatError {
    #[error("vertex format `{format}` declares no elements")]
    Empty { format: &'static str },

    #[error("`{format}`: {semantic} ends at byte {end}, past the stride of {stride}")]
    OutOfStride {
        format: &'static str,
        semantic: &'static str,
        end: u32,
        stride: u32,
    },

    #[error("`{format}`: {first} and {second} overlap")]
    Overlap {
        format: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("`{format}`: location {location} is used twice")]
    DuplicateLocation { format: &'static str, location: u32 },

    #[error("`{format}`: stride {stride} does not match the vertex type size {type_size}")]
    StrideMismatch {
        format: &'static str,
        stride: u32,
        type_size: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROKEN: VertexFormat = VertexFormat {
        name: "broken",
        stride: 16,
        step: StepMode::Vertex,
        elements: &[
            VertexElement {
                semantic: "POSITION",
                semantic_index: 0,
                format: ElementFormat::Float32x3,
                offset: 0,
                location: 0,
            },
            VertexElement {
                semantic: "TEXCOORD",
                semantic_index: 0,
                format: ElementFormat::Float32x2,
                offset: 8,
                location: 1,
            },
        ],
    };

    #[test]
    fn standard_vertex_is_valid() {
        assert_eq!(
            crate::vertex::Vertex::FORMAT.validate_for::<crate::vertex::Vertex>(),
            Ok(())
        );
        assert_eq!(
            crate::vertex::InstanceData::FORMAT.validate_for::<crate::vertex::InstanceData>(),
            Ok(())
        );
    }

    #[test]
    fn overlap_is_rejected() {
        assert_eq!(
            BROKEN.validate(),
            Err(VertexFormatError::Overlap {
                format: "broken",
                first: "POSITION",
                second: "TEXCOORD",
            })
        );
    }

    #[test]
    fn element_past_stride_is_rejected() {
        const SHORT: VertexFormat = VertexFormat {
            name: "short",
            stride: 8,
            step: StepMode::Vertex,
            elements: &[VertexElement {
                semantic: "POSITION",
                semantic_index: 0,
                format: ElementFormat::Float32x3,
                offset: 0,
                location: 0,
            }],
        };
        assert_eq!(
            SHORT.validate(),
            Err(VertexFormatError::OutOfStride {
                format: "short",
                semantic: "POSITION",
                end: 12,
                stride: 8,
            })
        );
    }

    #[test]
    fn stride_must_match_type() {
        static POS_ONLY: VertexFormat = VertexFormat {
            name: "pos-only",
            stride: 12,
            step: StepMode::Vertex,
            elements: &[VertexElement {
                semantic: "POSITION",
                semantic_index: 0,
                format: ElementFormat::Float32x3,
                offset: 0,
                location: 0,
            }],
        };
        assert!(matches!(
            POS_ONLY.validate_for::<crate::vertex::Vertex>(),
            Err(VertexFormatError::StrideMismatch { stride: 12, type_size: 32, .. })
        ));
    }
}
