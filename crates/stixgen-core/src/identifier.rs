use rand::Rng;

/// Make a random identifier of the form `<type>--<uuid-v4>`.  The UUID is
/// drawn from the caller's RNG so identifier streams are reproducible under
/// a fixed seed.
pub fn random_id(stix_type: &str, rng: &mut (impl Rng + ?Sized)) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    format!("{stix_type}--{}", uuid::Uuid::from_bytes(bytes))
}

/// Extract the object type encoded in an identifier, if it has the
/// `<type>--<uuid>` form.
pub fn type_of(id: &str) -> Option<&str> {
    id.split_once("--").map(|(stix_type, _)| stix_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn id_round_trips_its_type() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let id = random_id("ipv4-addr", &mut rng);
        assert_eq!(type_of(&id), Some("ipv4-addr"));

        let uuid_part = id.split_once("--").unwrap().1;
        assert!(uuid::Uuid::parse_str(uuid_part).is_ok());
    }

    #[test]
    fn type_of_rejects_plain_strings() {
        assert_eq!(type_of("not an id"), None);
    }
}
