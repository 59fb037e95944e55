use crate::core::models::VideoId;

pub const GROUP_LABEL_PREFIX: &str = "dup-";

const HEX_TOKEN_LEN: usize = 4;
const MAX_HEX_TOKEN_LEN: usize = 8;

/// Derives the canonical duplicate-group label from a member set.
///
/// The label only depends on which IDs are in the set, never on their order,
/// so any process holding the same members computes the same label.
pub struct GroupIdentity;

impl GroupIdentity {
    /// `dup-{n}v-{hex}` for the given members, e.g. `{7, 3, 5}` → `dup-3v-2e3f`.
    pub fn label<'a, I>(ids: I) -> String
    where
        I: IntoIterator<Item = &'a VideoId>,
    {
        let mut sorted: Vec<VideoId> = ids.into_iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let joined = sorted
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-");

        let hex = format!("{:x}", rolling_hash(&joined).unsigned_abs());
        let token: String = hex.chars().take(HEX_TOKEN_LEN).collect();

        format!("{}{}v-{}", GROUP_LABEL_PREFIX, sorted.len(), token)
    }
}

/// 32-bit `h = h * 31 + byte` with two's-complement wraparound.
pub(crate) fn rolling_hash(input: &str) -> i32 {
    input
        .bytes()
        .fold(0i32, |h, b| h.wrapping_mul(31).wrapping_add(i32::from(b)))
}

/// Whether `name` follows the `dup-{n}v-{h}` group label pattern, with `h`
/// between 1 and 8 lowercase hex digits.
pub fn is_group_label(name: &str) -> bool {
    let Some(rest) = name.strip_prefix(GROUP_LABEL_PREFIX) else {
        return false;
    };
    let Some((count, token)) = rest.split_once("v-") else {
        return false;
    };

    !count.is_empty()
        && count.bytes().all(|b| b.is_ascii_digit())
        && (1..=MAX_HEX_TOKEN_LEN).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
