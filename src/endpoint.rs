// URL building for the EvalAI challenge endpoints, plus the small string
// helpers the flow needs around it (host classification, token masking).

use crate::config::{Mode, TeamPk};

/// Segment some older backends answer with a 404; the shorter form works.
pub const DUPLICATED_SEGMENT: &str = "/challenge/challenge_host_team/";
const FIXED_SEGMENT: &str = "/challenge_host_team/";

const LOCALHOST_INDICATORS: [&str; 4] = ["127.0.0.1", "localhost", "0.0.0.0", "host.docker.internal"];

/// Join `base` with the mode's template, with exactly one `/` between them.
pub fn challenge_url(base: &str, mode: Mode, team_pk: &TeamPk) -> String {
    let rel = mode.template().replace("{}", &team_pk.to_string());
    format!("{}/{}", base.trim_end_matches('/'), rel.trim_start_matches('/'))
}

pub fn is_localhost_url(url: &str) -> bool {
    let url = url.to_lowercase();
    LOCALHOST_INDICATORS.iter().any(|i| url.contains(i))
}

pub fn has_duplicated_segment(url: &str) -> bool {
    url.contains(DUPLICATED_SEGMENT)
}

/// The URL to retry with after a 404, if the duplicated segment is present.
pub fn strip_duplicated_segment(url: &str) -> Option<String> {
    if has_duplicated_segment(url) {
        Some(url.replace(DUPLICATED_SEGMENT, FIXED_SEGMENT))
    } else {
        None
    }
}

/// URL variants probed with OPTIONS in debug mode, de-duplicated in order.
pub fn preflight_candidates(url: &str) -> Vec<String> {
    let toggled = match url.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => format!("{}/", url),
    };
    let all = [
        url.to_string(),
        url.replace(DUPLICATED_SEGMENT, FIXED_SEGMENT),
        toggled,
    ];
    let mut out: Vec<String> = Vec::with_capacity(all.len());
    for candidate in all {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Keep only the ends of a secret so it can be logged.
pub fn mask(secret: &str) -> String {
    const KEEP: usize = 6;
    let t = secret.trim();
    if t.is_empty() {
        return "<empty>".to_string();
    }
    let chars: Vec<char> = t.chars().collect();
    if chars.len() > 2 * KEEP {
        let head: String = chars[..KEEP].iter().collect();
        let tail: String = chars[chars.len() - KEEP..].iter().collect();
        format!("{}…{}", head, tail)
    } else {
        format!("<len:{}>", chars.len())
    }
}
