use crate::mapping::{FacetMapping, Lookup};
use crate::observer::{NoopObserver, PipelineObserver};

/// Value written after the last encoded tag.
pub const PAD_INDEX: u32 = 0;

/// Encode `names` through `mapping` into exactly `maxlen` indices.
///
/// Unknown names become the mapping's OOV index. Shorter input is padded on
/// the right with [`PAD_INDEX`]; longer input keeps its first `maxlen` tags, so
/// the caller's tag order decides what survives truncation.
pub fn encode_and_pad<S: AsRef<str>>(names: &[S], mapping: &FacetMapping, maxlen: usize) -> Vec<u32> {
    encode_and_pad_observed(names, mapping, maxlen, &NoopObserver)
}

pub fn encode_and_pad_observed<S: AsRef<str>>(
    names: &[S],
    mapping: &FacetMapping,
    maxlen: usize,
    observer: &dyn PipelineObserver,
) -> Vec<u32> {
    let mut encoded = Vec::with_capacity(maxlen);

    // Tags past maxlen are dropped before lookup.
    for name in names.iter().take(maxlen) {
        let name = name.as_ref();
        let index = match mapping.lookup(name) {
            Lookup::Mapped(index) => index,
            Lookup::OutOfVocabulary => {
                observer.out_of_vocabulary(mapping.facet(), name);
                mapping.oov_index()
            }
        };
        encoded.push(index);
    }

    encoded.resize(maxlen, PAD_INDEX);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::Facet;
    use crate::observer::testing::RecordingObserver;

    fn platform_mapping() -> FacetMapping {
        FacetMapping::new(Facet::Platform, [("web", 1), ("mobile", 2), ("desktop", 3)]).unwrap()
    }

    #[test]
    fn pads_on_the_right_and_keeps_order() {
        let encoded = encode_and_pad(&["mobile", "web"], &platform_mapping(), 5);
        assert_eq!(encoded, vec![2, 1, 0, 0, 0]);
    }

    #[test]
    fn truncates_from_the_right() {
        let encoded = encode_and_pad(&["desktop", "web", "mobile"], &platform_mapping(), 2);
        assert_eq!(encoded, vec![3, 1]);
    }

    #[test]
    fn output_length_always_equals_maxlen() {
        let mapping = platform_mapping();
        let inputs: [&[&str]; 4] = [&[], &["web"], &["web", "mobile", "desktop"], &["x"; 9]];

        for maxlen in 1..6 {
            for input in inputs {
                assert_eq!(encode_and_pad(input, &mapping, maxlen).len(), maxlen);
            }
        }
    }

    #[test]
    fn known_name_encodes_to_its_index() {
        let mapping = platform_mapping();
        for (name, index) in [("web", 1), ("mobile", 2), ("desktop", 3)] {
            assert_eq!(encode_and_pad(&[name], &mapping, 3)[0], index);
        }
    }

    #[test]
    fn unknown_name_encodes_to_oov_and_is_reported() {
        let mapping = platform_mapping();
        let observer = RecordingObserver::default();

        let encoded = encode_and_pad_observed(&["web", "smartwatch"], &mapping, 3, &observer);

        assert_eq!(encoded, vec![1, 4, 0]);
        assert!(!mapping.contains_index(encoded[1]));
        assert_eq!(
            observer.oov.lock().unwrap().as_slice(),
            &[(Facet::Platform, "smartwatch".to_string())]
        );
    }

    #[test]
    fn zero_based_mapping_never_uses_zero_for_oov() {
        let mapping = FacetMapping::new(Facet::Role, [("backend", 0), ("frontend", 1)]).unwrap();
        let encoded = encode_and_pad(&["devops"], &mapping, 2);
        assert_eq!(encoded, vec![2, 0]);
    }
}
