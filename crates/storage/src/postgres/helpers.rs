//! Shared helper functions for PostgreSQL row conversion and error mapping.

use tensorscan_core::error::{StorageError, StorageResult};

/// Map a sqlx error, keeping constraint violations distinguishable.
///
/// Unique and foreign key violations become
/// [`StorageError::ConstraintViolation`] carrying the constraint name, so
/// callers can tell "already stored" from other failures.
pub fn query_error(err: sqlx::Error) -> StorageError {
    if let Some(db_err) = err.as_database_error()
        && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
    {
        let message = match db_err.constraint() {
            Some(constraint) => format!("{} ({})", db_err.message(), constraint),
            None => db_err.message().to_string(),
        };
        return StorageError::ConstraintViolation(message);
    }
    StorageError::QueryError(err.to_string())
}

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Convert a `Vec<u8>` to a 32-byte array, rejecting all-zero values as corrupt.
///
/// Use for block hashes, where all-zeros indicates data corruption. The
/// genesis parent hash is legitimately zero and must use [`bytes_to_hash32`].
pub fn bytes_to_hash32_strict(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    let arr = bytes_to_hash32(bytes, field_name)?;

    if arr == [0u8; 32] {
        return Err(StorageError::SerializationError(format!(
            "{} is all zeros, which indicates data corruption",
            field_name
        )));
    }

    Ok(arr)
}

/// Parse a `NUMERIC` column read back as text.
pub fn parse_u128(value: Option<String>, field_name: &str) -> StorageResult<Option<u128>> {
    value
        .map(|v| {
            v.parse::<u128>().map_err(|e| {
                StorageError::SerializationError(format!("{} is not a u128: {}", field_name, e))
            })
        })
        .transpose()
}
