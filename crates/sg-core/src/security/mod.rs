//! Security utilities: hybrid payload decryption for encrypted client requests.

pub mod hybrid;
