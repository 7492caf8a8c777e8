use glam::IVec2;

/// Low-bias 32-bit integer hash (lowbias32 constants).
#[inline]
pub fn lowbias32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x21f0_aaad);
    x ^= x >> 15;
    x = x.wrapping_mul(0xd35a_2d97);
    x ^= x >> 15;
    x
}

/// Deterministic per-parcel random stream: the same parcel and seed always
/// produce the same sequence, independent of threads or frame order.
#[derive(Clone, Copy, Debug)]
pub struct ParcelRng {
    state: u32,
}

impl ParcelRng {
    /// Stand-in seed when the hash lands on zero (xorshift fixpoint).
    const ZERO_SEED: u32 = 0x6487_ed51;

    pub fn new(parcel: IVec2, random_seed: u32) -> Self {
        // Shift parcels into positive range so the packing below is stable
        // across the sign boundary.
        let p = parcel + IVec2::splat(32768);
        let packed = ((p.y as u32) << 16)
            .wrapping_add((p.x as u32) & 0xffff)
            .wrapping_add(random_seed);
        let seed = lowbias32(packed);
        Self {
            state: if seed != 0 { seed } else { Self::ZERO_SEED },
        }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in [0, 1).
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * (1.0 / 16_777_216.0)
    }

    #[inline]
    pub fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Uniform rotation in degrees, [0, 360).
    #[inline]
    pub fn angle_deg(&mut self) -> f32 {
        self.next_f32() * 360.0
    }

    /// Uniform in [0, n).
    #[inline]
    pub fn range_u32(&mut self, n: u32) -> u32 {
        if n == 0 { 0 } else { self.next_u32() % n }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_parcel_same_stream() {
        let mut a = ParcelRng::new(IVec2::new(-3, 17), 42);
        let mut b = ParcelRng::new(IVec2::new(-3, 17), 42);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn neighboring_parcels_diverge() {
        let mut a = ParcelRng::new(IVec2::new(0, 0), 1);
        let mut b = ParcelRng::new(IVec2::new(1, 0), 1);
        let firsts: Vec<u32> = (0..4).map(|_| a.next_u32()).collect();
        let others: Vec<u32> = (0..4).map(|_| b.next_u32()).collect();
        assert_ne!(firsts, others);
    }

    #[test]
    fn next_f32_stays_in_unit_interval() {
        let mut rng = ParcelRng::new(IVec2::new(5, -9), 7);
        for _ in 0..1000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn zero_hash_falls_back_to_nonzero_state() {
        // Whatever the inputs, the state never starts at the xorshift
        // fixpoint.
        for y in -2..2 {
            for x in -2..2 {
                let mut rng = ParcelRng::new(IVec2::new(x, y), 0);
                assert_ne!(rng.next_u32(), 0);
            }
        }
    }
}
