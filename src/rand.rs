//! The single place where we generate random material for our own use.

use ring::rand::{SecureRandom, SystemRandom};

/// Fill the whole slice with random material.
pub(crate) fn fill_random(bytes: &mut [u8]) -> Result<(), GetRandomFailed> {
    SystemRandom::new()
        .fill(bytes)
        .map_err(|_| GetRandomFailed)
}

/// Make an array of size `N` containing random material.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N], GetRandomFailed> {
    let mut v = [0; N];
    fill_random(&mut v)?;
    Ok(v)
}

/// Random material generation failed.
#[derive(Debug)]
pub struct GetRandomFailed;
