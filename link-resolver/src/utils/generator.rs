use rand::Rng;

const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const LINK_ID_LENGTH: usize = 12;

/// Generates a random base62 string of the given length
pub fn generate_base62_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut result = String::with_capacity(length);

    for _ in 0..length {
        let idx = rng.gen_range(0..BASE62_CHARS.len());
        result.push(BASE62_CHARS[idx] as char);
    }

    result
}

/// Primary key for a new link. Never contains a dash, so a bare link id can
/// not be mistaken for a `slug-shortId` pair.
pub fn generate_link_id() -> String {
    generate_base62_string(LINK_ID_LENGTH)
}
