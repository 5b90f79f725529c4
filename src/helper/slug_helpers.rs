use regex::Regex;

/// How long a caller should hold a `PendingDerivation` before firing it, so
/// the slug is not re-derived on every keystroke.
pub const SLUG_DEBOUNCE_MS: u64 = 300;

/// Derives a URL-safe identifier from a human title. Pure and deterministic:
/// lowercase, drop anything outside `[a-z0-9- ]`, collapse whitespace and
/// hyphen runs to single hyphens, trim hyphens at both ends.
pub fn generate_slug(title: &str) -> String {
    let lowered = title.to_lowercase();
    let filtered: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ' || *c == '-')
        .collect();

    filtered
        .split(|c: char| c == ' ' || c == '-')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Non-empty lowercase alphanumeric segments joined by single hyphens; no
/// leading, trailing, or doubled hyphens.
pub fn is_valid_slug(slug: &str) -> bool {
    let pattern = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
    pattern.is_match(slug)
}

/// Editable slug field with lock semantics. New posts start unlocked so the
/// slug tracks the title; reopening a saved post (or hand-editing the slug)
/// locks it so auto-derivation stops fighting the author.
#[derive(Debug, Clone)]
pub struct SlugField {
    slug: String,
    locked: bool,
    serial: u64,
}

/// A scheduled (debounced) derivation. The lock flag is checked when the
/// timer fires, not when it was scheduled; a stale timer that outlived a
/// manual edit or a newer schedule is a no-op.
#[derive(Debug, Clone)]
pub struct PendingDerivation {
    title: String,
    serial: u64,
}

impl PendingDerivation {
    pub fn fire(self, field: &mut SlugField) -> bool {
        if field.locked || self.serial != field.serial {
            return false;
        }
        field.slug = generate_slug(&self.title);
        true
    }
}

impl SlugField {
    pub fn for_new_post() -> Self {
        SlugField {
            slug: String::new(),
            locked: false,
            serial: 0,
        }
    }

    pub fn for_existing_post(slug: &str) -> Self {
        SlugField {
            slug: slug.to_string(),
            locked: true,
            serial: 0,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Called on every title keystroke. Returns the derivation to run after
    /// the debounce delay, or None while the field is locked. Each call
    /// supersedes any derivation scheduled earlier.
    pub fn note_title_change(&mut self, title: &str) -> Option<PendingDerivation> {
        if self.locked {
            return None;
        }
        self.serial += 1;
        Some(PendingDerivation {
            title: title.to_string(),
            serial: self.serial,
        })
    }

    /// A direct edit of the slug field takes the value verbatim and locks.
    pub fn edit_manually(&mut self, value: &str) {
        self.slug = value.to_string();
        self.locked = true;
        self.serial += 1;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    /// One derivation from the current title, then locked again. Regenerate
    /// and lock are independent toggles: regenerating while unlocked still
    /// ends locked.
    pub fn regenerate(&mut self, title: &str) {
        self.slug = generate_slug(title);
        self.locked = true;
        self.serial += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_and_valid() {
        let titles = [
            "Pool Closed Friday!",
            "  Annual   HOA Meeting  ",
            "Q2-2026 Budget: Review & Vote",
            "déjà vu on Elm Street",
        ];
        for title in titles {
            let first = generate_slug(title);
            assert_eq!(first, generate_slug(title));
            assert!(is_valid_slug(&first), "invalid slug {:?} from {:?}", first, title);
        }
        assert_eq!(generate_slug("Pool Closed Friday!"), "pool-closed-friday");
        assert_eq!(generate_slug("a -- b"), "a-b");
        assert_eq!(generate_slug("!!!"), "");
    }

    #[test]
    fn validity_boundaries() {
        assert!(is_valid_slug("my-post-1"));
        assert!(!is_valid_slug("My Post"));
        assert!(!is_valid_slug("-lead"));
        assert!(!is_valid_slug("trail-"));
        assert!(!is_valid_slug("a--b"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn title_changes_track_while_unlocked() {
        let mut field = SlugField::for_new_post();
        let pending = field.note_title_change("Pool Closed").unwrap();
        assert!(pending.fire(&mut field));
        assert_eq!(field.slug(), "pool-closed");
    }

    #[test]
    fn manual_edit_locks_until_explicit_unlock() {
        let mut field = SlugField::for_new_post();
        field.edit_manually("hand-picked");
        assert!(field.is_locked());
        assert!(field.note_title_change("New Title").is_none());
        assert_eq!(field.slug(), "hand-picked");

        field.unlock();
        let pending = field.note_title_change("New Title").unwrap();
        assert!(pending.fire(&mut field));
        assert_eq!(field.slug(), "new-title");
    }

    #[test]
    fn stale_timer_checks_lock_at_fire_time() {
        let mut field = SlugField::for_new_post();
        // Scheduled while unlocked...
        let pending = field.note_title_change("Typed Title").unwrap();
        // ...but the user hand-edits before the debounce fires.
        field.edit_manually("manual");
        assert!(!pending.fire(&mut field));
        assert_eq!(field.slug(), "manual");
    }

    #[test]
    fn newer_schedule_supersedes_older_one() {
        let mut field = SlugField::for_new_post();
        let first = field.note_title_change("First").unwrap();
        let second = field.note_title_change("First Draft").unwrap();
        assert!(!first.fire(&mut field));
        assert!(second.fire(&mut field));
        assert_eq!(field.slug(), "first-draft");
    }

    #[test]
    fn regenerate_derives_once_and_relocks() {
        let mut field = SlugField::for_existing_post("old-slug");
        field.regenerate("Fresh Title");
        assert_eq!(field.slug(), "fresh-title");
        assert!(field.is_locked());
        assert!(field.note_title_change("Another").is_none());
    }
}
