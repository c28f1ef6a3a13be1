// src/utils.rs
// Utility functions for the Pokedex SDK

/// Splits an inclusive id range into `(start, end)` chunks of at most `chunk_size` ids.
/// Used to batch bulk population.
pub fn create_id_chunks(from_id: u32, to_id: u32, chunk_size: u32) -> Vec<(u32, u32)> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current_from = from_id;
    while current_from <= to_id {
        let current_to = current_from.saturating_add(chunk_size - 1).min(to_id);
        chunks.push((current_from, current_to));
        if current_to == u32::MAX {
            break;
        }
        current_from = current_to + 1;
    }
    chunks
}

/// Extracts the trailing numeric id from a resource URL such as
/// `https://pokeapi.co/api/v2/pokemon-species/25/`.
pub fn parse_id_from_url(url: &str) -> Option<u32> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_id_chunks() {
        assert_eq!(create_id_chunks(1, 10, 4), vec![(1, 4), (5, 8), (9, 10)]);
        assert_eq!(create_id_chunks(3, 3, 8), vec![(3, 3)]);
        assert!(create_id_chunks(5, 4, 8).is_empty());
    }

    #[test]
    fn test_parse_id_from_url() {
        assert_eq!(
            parse_id_from_url("https://pokeapi.co/api/v2/pokemon-species/25/"),
            Some(25)
        );
        assert_eq!(parse_id_from_url("https://pokeapi.co/api/v2/pokemon/10034"), Some(10034));
        assert_eq!(parse_id_from_url("https://pokeapi.co/api/v2/pokemon/pikachu/"), None);
        assert_eq!(parse_id_from_url(""), None);
    }
}
