use anyhow::Result;
use rkyv::{
    Archive,
    api::high::{HighDeserializer, HighValidator, to_bytes_with_alloc},
    bytecheck::CheckBytes,
    rancor,
    ser::allocator::Arena,
    util::AlignedVec,
};

pub fn serialize_for_db<T>(value: &T) -> Result<AlignedVec>
where
    T: for<'a> rkyv::Serialize<
            rkyv::api::high::HighSerializer<
                AlignedVec,
                rkyv::ser::allocator::ArenaHandle<'a>,
                rancor::Error,
            >,
        >,
{
    let mut arena = Arena::new();
    to_bytes_with_alloc::<_, rancor::Error>(value, arena.acquire())
        .map_err(|e| anyhow::anyhow!("Serialization failed: {:?}", e))
}

/// Validates and deserializes a stored value.
///
/// redb hands out byte slices with no alignment guarantee, so the bytes are
/// copied into an aligned buffer before the archive is checked.
pub fn deserialize_from_db<T>(bytes: &[u8]) -> Result<T>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
        + rkyv::Deserialize<T, HighDeserializer<rancor::Error>>,
{
    let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    rkyv::from_bytes::<T, rancor::Error>(&aligned)
        .map_err(|e| anyhow::anyhow!("Deserialization failed: {:?}", e))
}
