use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "clever", "crisp", "daring", "eager", "gentle", "golden",
    "hidden", "humble", "lively", "lucky", "mellow", "misty", "nimble", "quiet", "rapid", "rustic",
    "silent", "silver", "steady", "sunny", "swift", "tidy", "vivid", "warm", "wild", "witty",
];

const VERBS: &[&str] = &[
    "building", "carving", "chasing", "dancing", "drifting", "dreaming", "floating", "folding",
    "gliding", "growing", "humming", "jumping", "leaping", "mending", "painting", "planting",
    "roaming", "rolling", "running", "sailing", "singing", "skating", "sliding", "soaring",
    "spinning", "swimming", "tracing", "wandering", "weaving", "whistling",
];

const NOUNS: &[&str] = &[
    "anchor", "badger", "beacon", "brook", "canyon", "cedar", "comet", "falcon", "fern", "harbor",
    "heron", "island", "lantern", "maple", "meadow", "otter", "pebble", "pine", "quarry", "river",
    "robin", "sparrow", "summit", "thistle", "tiger", "valley", "walrus", "willow", "wren", "zephyr",
];

fn pick<R: Rng + ?Sized>(words: &[&'static str], rng: &mut R) -> &'static str {
    words.choose(rng).copied().unwrap_or("plan")
}

/// A random `adjective-verb-noun.md` filename.
pub fn generate_plan_name() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}-{}-{}.md",
        pick(ADJECTIVES, rng),
        pick(VERBS, rng),
        pick(NOUNS, rng)
    )
}

/// Generate names until `taken` reports a free one, giving up after
/// `max_attempts`.
pub fn generate_unique(max_attempts: usize, taken: impl Fn(&str) -> bool) -> Option<String> {
    (0..max_attempts)
        .map(|_| generate_plan_name())
        .find(|name| !taken(name))
}
