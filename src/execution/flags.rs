//! Per-script capability flags

use serde::Serialize;
use std::fmt;

/// A single execution capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flag {
    Interactive,
    Fakeroot,
    Fakechroot,
    Chroot,
    DirectExec,
    IgnoreExit,
    Skip,
}

impl Flag {
    const ALL: [Flag; 7] = [
        Flag::Interactive,
        Flag::Fakeroot,
        Flag::Fakechroot,
        Flag::Chroot,
        Flag::DirectExec,
        Flag::IgnoreExit,
        Flag::Skip,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// Filename letter selecting this flag, if any
    pub fn letter(self) -> Option<char> {
        match self {
            Flag::Interactive => Some('I'),
            Flag::Fakeroot => Some('R'),
            Flag::Fakechroot => Some('F'),
            Flag::Chroot => Some('C'),
            Flag::IgnoreExit => Some('E'),
            Flag::Skip => Some('S'),
            Flag::DirectExec => None,
        }
    }
}

/// Immutable set of [`Flag`]s.
///
/// Chroot always comes with fakeroot and fakechroot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(u8);

impl FlagSet {
    pub const fn empty() -> Self {
        FlagSet(0)
    }

    /// Build a set from flags, adding the wrappers chroot depends on.
    pub fn from_flags(flags: &[Flag]) -> Self {
        let mut bits = 0u8;
        for flag in flags {
            bits |= flag.bit();
            if *flag == Flag::Chroot {
                bits |= Flag::Fakeroot.bit() | Flag::Fakechroot.bit();
            }
        }
        FlagSet(bits)
    }

    /// Set holding exactly `flags`, without the implied wrappers.
    #[cfg(test)]
    pub(crate) fn exact(flags: &[Flag]) -> Self {
        FlagSet(flags.iter().fold(0, |bits, flag| bits | flag.bit()))
    }

    /// Parse filename flag letters. Unknown letters are returned alongside
    /// the set so the caller can report them.
    pub fn from_letters(letters: &str) -> (Self, Vec<char>) {
        let mut flags = Vec::new();
        let mut unknown = Vec::new();

        for letter in letters.chars() {
            match letter {
                'I' => flags.push(Flag::Interactive),
                'R' => flags.push(Flag::Fakeroot),
                'F' => flags.push(Flag::Fakechroot),
                'C' => flags.push(Flag::Chroot),
                'E' => flags.push(Flag::IgnoreExit),
                'S' => flags.push(Flag::Skip),
                other => unknown.push(other),
            }
        }

        (Self::from_flags(&flags), unknown)
    }

    pub fn contains(&self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::ALL.into_iter().filter(|f| self.contains(*f))
    }

    pub fn interactive(&self) -> bool {
        self.contains(Flag::Interactive)
    }

    pub fn chroot(&self) -> bool {
        self.contains(Flag::Chroot)
    }

    pub fn direct_exec(&self) -> bool {
        self.contains(Flag::DirectExec)
    }

    pub fn ignore_exit(&self) -> bool {
        self.contains(Flag::IgnoreExit)
    }

    pub fn skip(&self) -> bool {
        self.contains(Flag::Skip)
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in self.iter() {
            match flag.letter() {
                Some(letter) => write!(f, "{}", letter)?,
                None => write!(f, "+")?,
            }
        }
        Ok(())
    }
}

impl Serialize for FlagSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroot_letter_implies_fake_wrappers() {
        for letters in ["C", "IC", "CE", "RCF", "SC", "EIC"] {
            let (set, unknown) = FlagSet::from_letters(letters);
            assert!(unknown.is_empty());
            assert!(set.chroot(), "{}", letters);
            assert!(set.contains(Flag::Fakeroot), "{}", letters);
            assert!(set.contains(Flag::Fakechroot), "{}", letters);
        }
    }

    #[test]
    fn letters_map_to_flags() {
        let (set, _) = FlagSet::from_letters("IRFES");
        assert!(set.interactive());
        assert!(set.contains(Flag::Fakeroot));
        assert!(set.contains(Flag::Fakechroot));
        assert!(set.ignore_exit());
        assert!(set.skip());
        assert!(!set.chroot());
        assert!(!set.direct_exec());
    }

    #[test]
    fn unknown_letters_are_reported() {
        let (set, unknown) = FlagSet::from_letters("RXZ");
        assert_eq!(unknown, vec!['X', 'Z']);
        assert_eq!(set, FlagSet::from_flags(&[Flag::Fakeroot]));
    }

    #[test]
    fn empty_letters_give_empty_set() {
        let (set, unknown) = FlagSet::from_letters("");
        assert!(set.is_empty());
        assert!(unknown.is_empty());
    }

    #[test]
    fn display_lists_letters() {
        let set = FlagSet::from_flags(&[Flag::Chroot, Flag::IgnoreExit]);
        assert_eq!(set.to_string(), "RFCE");
    }

    #[test]
    fn serializes_as_kebab_case_list() {
        let set = FlagSet::from_flags(&[Flag::Interactive, Flag::DirectExec]);
        assert_eq!(
            serde_json::to_string(&set).unwrap(),
            r#"["interactive","direct-exec"]"#
        );
    }
}
