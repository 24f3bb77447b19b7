//! Fixed, little-endian wire records for octants crossing rank boundaries.
//!
//! All multi-byte integers are stored pre-LE with `.to_le()` and decoded
//! with `from_le()`, so the byte stream is identical on every host.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::octant::{Octant, RefineFlag};

/// One octant plus its sender-side bookkeeping on the wire.
///
/// The third coordinate is zero in 2D; `local_index` is the sender's local
/// position of the octant (the ghost "piggy" field).
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireOctant {
    pub coords_le: [i32; 3],
    pub level_le: i32,
    pub flag_le: i32,
    pub local_index_le: i32,
}

const_assert_eq!(std::mem::size_of::<WireOctant>(), 24);

impl WireOctant {
    pub fn encode<const D: usize>(oct: &Octant<D>, flag: RefineFlag, local_index: usize) -> Self {
        let mut coords = [0i32; 3];
        coords[..D].copy_from_slice(&oct.coords);
        for c in coords.iter_mut() {
            *c = c.to_le();
        }
        Self {
            coords_le: coords,
            level_le: (oct.level as i32).to_le(),
            flag_le: flag.to_wire().to_le(),
            local_index_le: (local_index as i32).to_le(),
        }
    }

    pub fn decode<const D: usize>(&self) -> (Octant<D>, RefineFlag, usize) {
        let mut coords = [0i32; D];
        for (axis, c) in coords.iter_mut().enumerate() {
            *c = i32::from_le(self.coords_le[axis]);
        }
        let oct = Octant { coords, level: i32::from_le(self.level_le) as u8 };
        let flag = RefineFlag::from_wire(i32::from_le(self.flag_le));
        (oct, flag, i32::from_le(self.local_index_le) as usize)
    }
}

/// Serialize a batch of wire octants to bytes.
pub fn to_bytes(records: &[WireOctant]) -> Vec<u8> {
    bytemuck::cast_slice(records).to_vec()
}

/// Deserialize a batch of wire octants from bytes.
pub fn from_bytes(bytes: &[u8]) -> Vec<WireOctant> {
    debug_assert!(bytes.len() % std::mem::size_of::<WireOctant>() == 0);
    bytemuck::cast_slice(bytes).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octant::Quadrant;

    #[test]
    fn roundtrip() {
        let q = Quadrant::from_morton(3, 42);
        let w = WireOctant::encode(&q, RefineFlag::Coarsen, 7);
        let bytes = to_bytes(&[w]);
        let back = from_bytes(&bytes);
        let (oct, flag, idx) = back[0].decode::<2>();
        assert_eq!(oct, q);
        assert_eq!(flag, RefineFlag::Coarsen);
        assert_eq!(idx, 7);
    }
}
