//! Match a paragraph's emotion to the nearest unused clip.

use crate::types::{ClipLibrary, EmotionPoint, UsedClips};

/// Return the id of the clip closest to `target`, skipping `excluded` ids.
///
/// Distance is Euclidean in valence/arousal space. On exact ties the clip
/// met first in library order wins. Returns `None` when the library is
/// empty or every clip is excluded.
pub fn find_closest<'a>(
    target: &EmotionPoint,
    library: &'a ClipLibrary,
    excluded: &UsedClips,
) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;

    for clip in library.iter() {
        if excluded.contains(&clip.id) {
            continue;
        }
        let d = target.distance(&clip.emotion);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            // NaN distances never win
            _ if d.is_nan() => {}
            _ => best = Some((clip.id.as_str(), d)),
        }
    }

    best.map(|(id, _)| id)
}
