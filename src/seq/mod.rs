//! Alphabet traits and k-mer key packing (component A).
//!
//! A k-mer key is an unsigned integer packing `k` base codes, each using
//! `bits_per_code()` bits, left-to-right: `(s[0] << (k-1)*b) | ... | s[k-1]`.
//! Only the low `k * bits_per_code()` bits are significant.

/// One base/residue code, plus whichever ambiguous codes it can expand to.
pub type AmbiguousCodes = Vec<u8>;

/// A sequence alphabet: encode/decode single characters and whole k-mers.
pub trait Alphabet {
    /// Key type wide enough to pack `max_kmer_length()` codes.
    type Key: Copy
        + Eq
        + std::hash::Hash
        + Ord
        + std::ops::Shl<u32, Output = Self::Key>
        + std::ops::Shr<u32, Output = Self::Key>
        + std::ops::BitOr<Output = Self::Key>
        + std::ops::BitAnd<Output = Self::Key>
        + From<u8>
        + Into<u128>
        + Default;

    /// Number of distinct codes in the alphabet (4 for DNA, 20 for amino acids).
    fn alphabet_size() -> usize;

    /// Number of bits used to store one code (`ceil(log2(alphabet_size))`).
    fn bits_per_code() -> u32;

    /// Maximum k-mer length representable in `Key` without overflow.
    fn max_kmer_length() -> usize;

    /// Decode a code (0..alphabet_size) back to its canonical character.
    fn decode(code: u8) -> char;

    /// Encode an unambiguous character. Returns `None` for gaps/unknowns/any
    /// ambiguity code (the no-ambiguity policy).
    fn encode(ch: char) -> Option<u8>;

    /// Encode a character that may be ambiguous, returning every code it can
    /// represent. Empty result means "not a valid character at all" (gap,
    /// unknown). A single-element result is unambiguous.
    fn encode_ambiguous(ch: char) -> AmbiguousCodes;
}

/// DNA alphabet: A=0, C=1, G=2, T/U=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dna;

impl Alphabet for Dna {
    type Key = u32;

    fn alphabet_size() -> usize {
        4
    }

    fn bits_per_code() -> u32 {
        2
    }

    fn max_kmer_length() -> usize {
        12
    }

    fn decode(code: u8) -> char {
        match code {
            0 => 'A',
            1 => 'C',
            2 => 'G',
            3 => 'T',
            _ => unreachable!("DNA codes are in 0..4"),
        }
    }

    fn encode(ch: char) -> Option<u8> {
        match ch {
            'A' | 'a' => Some(0),
            'C' | 'c' => Some(1),
            'G' | 'g' => Some(2),
            'T' | 't' | 'U' | 'u' => Some(3),
            _ => None,
        }
    }

    fn encode_ambiguous(ch: char) -> AmbiguousCodes {
        match ch {
            'A' | 'a' => vec![0],
            'C' | 'c' => vec![1],
            'G' | 'g' => vec![2],
            'T' | 't' | 'U' | 'u' => vec![3],
            'R' | 'r' => vec![0, 2],
            'Y' | 'y' => vec![1, 3],
            'S' | 's' => vec![1, 2],
            'W' | 'w' => vec![0, 3],
            'K' | 'k' => vec![2, 3],
            'M' | 'm' => vec![0, 1],
            'B' | 'b' => vec![1, 2, 3],
            'V' | 'v' => vec![0, 1, 2],
            'H' | 'h' => vec![0, 1, 3],
            'D' | 'd' => vec![0, 2, 3],
            'X' | 'x' | 'N' | 'n' | '.' => vec![0, 1, 2, 3],
            _ => vec![],
        }
    }
}

/// Amino-acid alphabet (20 residues), stubbed out in the original and
/// completed here since the serialization version tag already reserves a
/// bit for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Amino;

const AMINO_CODES: [char; 20] = [
    'A', 'R', 'N', 'D', 'C', 'Q', 'E', 'G', 'H', 'I', 'L', 'K', 'M', 'F', 'P', 'S', 'T', 'W', 'Y',
    'V',
];

impl Alphabet for Amino {
    type Key = u64;

    fn alphabet_size() -> usize {
        20
    }

    fn bits_per_code() -> u32 {
        5
    }

    fn max_kmer_length() -> usize {
        12
    }

    fn decode(code: u8) -> char {
        AMINO_CODES[code as usize]
    }

    fn encode(ch: char) -> Option<u8> {
        let upper = ch.to_ascii_uppercase();
        AMINO_CODES.iter().position(|&c| c == upper).map(|i| i as u8)
    }

    fn encode_ambiguous(ch: char) -> AmbiguousCodes {
        Self::encode(ch).into_iter().collect()
    }
}

/// Encode a k-mer string to its packed key. Returns `None` if any character
/// is unrecognized (gap/ambiguity) or the string exceeds `max_kmer_length()`.
pub fn encode_kmer<A: Alphabet>(s: &str) -> Option<A::Key> {
    if s.chars().count() > A::max_kmer_length() {
        return None;
    }
    let bits = A::bits_per_code();
    let mut key = A::Key::default();
    for ch in s.chars() {
        let code = A::encode(ch)?;
        key = (key << bits) | A::Key::from(code);
    }
    Some(key)
}

/// Encode a k-mer string allowing a single ambiguous alignment position
/// (spec §4.A's one-ambiguity policy): every character must be either
/// unambiguous or expand to more than one code at most once across the
/// whole string. Returns every candidate key the ambiguous position can
/// resolve to, or `None` if the string has more than one ambiguous
/// position, a character the alphabet cannot recognize at all, or exceeds
/// `max_kmer_length()`.
pub fn encode_kmer_one_ambiguity<A: Alphabet>(s: &str) -> Option<Vec<A::Key>> {
    if s.chars().count() > A::max_kmer_length() {
        return None;
    }
    let bits = A::bits_per_code();
    let mut candidates: Vec<A::Key> = vec![A::Key::default()];
    let mut seen_ambiguous = false;

    for ch in s.chars() {
        let codes = A::encode_ambiguous(ch);
        match codes.len() {
            0 => return None,
            1 => {
                let code = A::Key::from(codes[0]);
                for key in candidates.iter_mut() {
                    *key = (*key << bits) | code;
                }
            }
            _ => {
                if seen_ambiguous {
                    return None;
                }
                seen_ambiguous = true;
                let mut expanded = Vec::with_capacity(candidates.len() * codes.len());
                for &key in &candidates {
                    for &code in &codes {
                        expanded.push((key << bits) | A::Key::from(code));
                    }
                }
                candidates = expanded;
            }
        }
    }

    Some(candidates)
}

/// Decode a packed key of length `k` back into a k-mer string.
pub fn decode_kmer<A: Alphabet>(key: A::Key, k: usize) -> String {
    let bits = A::bits_per_code();
    let mask: u128 = (1u128 << bits) - 1;
    let mut out = vec!['\0'; k];
    let mut value: u128 = key.into();
    for i in (0..k).rev() {
        let code = (value & mask) as u8;
        out[i] = A::decode(code);
        value >>= bits;
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dna_round_trip() {
        for s in ["AAA", "ACGT", "TTTTTTTTTTTT", "GATTACA"] {
            let key = encode_kmer::<Dna>(s).expect("valid dna kmer");
            assert_eq!(decode_kmer::<Dna>(key, s.len()), s);
        }
    }

    #[test]
    fn test_dna_key_packing_order() {
        // "AAA" should be key 0; "AAC" should be key 1 (rightmost base varies fastest).
        assert_eq!(encode_kmer::<Dna>("AAA"), Some(0));
        assert_eq!(encode_kmer::<Dna>("AAC"), Some(1));
        assert_eq!(encode_kmer::<Dna>("ACA"), Some(1 << 2));
    }

    #[test]
    fn test_dna_rejects_ambiguous() {
        assert_eq!(encode_kmer::<Dna>("ANA"), None);
        assert_eq!(encode_kmer::<Dna>("A-A"), None);
    }

    #[test]
    fn test_dna_alphabet_closure() {
        for code in 0u8..4 {
            let ch = Dna::decode(code);
            assert_eq!(Dna::encode(ch), Some(code));
        }
    }

    #[test]
    fn test_dna_ambiguous_expansion() {
        assert_eq!(Dna::encode_ambiguous('R'), vec![0, 2]);
        assert_eq!(Dna::encode_ambiguous('N'), vec![0, 1, 2, 3]);
        assert_eq!(Dna::encode_ambiguous('A'), vec![0]);
    }

    #[test]
    fn test_amino_round_trip() {
        for s in ["ARN", "WYV", "MKLP"] {
            let key = encode_kmer::<Amino>(s).expect("valid amino kmer");
            assert_eq!(decode_kmer::<Amino>(key, s.len()), s);
        }
    }
}
