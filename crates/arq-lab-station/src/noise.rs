//! Bit errors for outgoing frames.

use rand::Rng;

/// Flip each bit of `frame` independently with probability `ber`.
/// Returns the number of flipped bits.
pub fn flip_bits<R: Rng + ?Sized>(rng: &mut R, frame: &mut [u8], ber: f64) -> u32 {
    if ber <= 0.0 {
        return 0;
    }
    let mut flipped = 0;
    for byte in frame.iter_mut() {
        for bit in 0..8 {
            if rng.random::<f64>() < ber {
                *byte ^= 1 << bit;
                flipped += 1;
            }
        }
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn zero_rate_leaves_frame_alone() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut frame = vec![0xAAu8; 64];
        assert_eq!(flip_bits(&mut rng, &mut frame, 0.0), 0);
        assert!(frame.iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn certain_rate_inverts_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut frame = vec![0x0Fu8; 4];
        assert_eq!(flip_bits(&mut rng, &mut frame, 1.0), 32);
        assert_eq!(frame, vec![0xF0; 4]);
    }
}
