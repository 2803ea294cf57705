//! # Module Loader
//!
//! An append-only search path that can grow after the process has started.
//! Symbols are resolved by asking each location in append order; the first location
//! providing a symbol wins and the answer is cached, so later appends never change
//! what an already-resolved symbol points to.
//!
//! Two variants share the same surface:
//!
//! - **Strict**: duplicate locations and locations that would shadow an
//!   already-resolved symbol are rejected with a [`LoaderStateError`].
//! - **Relaxed**: duplicates are silently ignored, which lets nested or repeated
//!   bootstraps append the same locations again without failing.
//!
//! A [`LoaderContext`] holds the loader installed for an execution context.

use crate::models::Location;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use thiserror::Error;

/// Why a loader refused a location.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderStateError {
    /// Strict variant only: the location is already on the search path.
    #[error("Location '{location}' is already on the search path.")]
    DuplicateLocation { location: Location },
    /// Strict variant only: the location provides a symbol already resolved
    /// from an earlier location.
    #[error(
        "Location '{location}' would shadow '{symbol}', already resolved from '{resolved_from}'."
    )]
    Shadowing {
        location: Location,
        symbol: String,
        resolved_from: Location,
    },
    /// The loader was frozen by re-entry.
    #[error("The search path is frozen; '{location}' cannot be appended after re-entry.")]
    Frozen { location: Location },
}

/// Failure policy of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderVariant {
    /// Rejects duplicates and shadowing locations.
    Strict,
    /// Ignores duplicates.
    Relaxed,
}

/// What happened to a location handed to [`ModuleLoader::add_location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The location is now last on the search path.
    Appended,
    /// Relaxed variant only: the location was already present.
    AlreadyPresent,
}

/// Answers whether a location provides a symbol.
pub trait SymbolLookup: Send + Sync {
    /// Whether `symbol` can be loaded from `location`.
    fn provides(&self, location: &Location, symbol: &str) -> bool;
}

/// Treats a symbol as a path relative to a directory location.
/// Archive locations are opaque to this lookup and never provide anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLookup;

impl SymbolLookup for FsLookup {
    fn provides(&self, location: &Location, symbol: &str) -> bool {
        let root = location.path();
        root.is_dir() && root.join(symbol).exists()
    }
}

#[derive(Debug, Default, Clone)]
struct LoaderState {
    locations: Vec<Location>,
    /// symbol -> index into `locations`
    resolved: HashMap<String, usize>,
    frozen: bool,
}

/// The append-only loader.
pub struct ModuleLoader {
    variant: LoaderVariant,
    lookup: Arc<dyn SymbolLookup>,
    state: Mutex<LoaderState>,
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ModuleLoader")
            .field("variant", &self.variant)
            .field("locations", &state.locations)
            .field("frozen", &state.frozen)
            .finish()
    }
}

impl ModuleLoader {
    /// Creates an empty loader looking symbols up on the filesystem.
    pub fn new(variant: LoaderVariant) -> Self {
        Self::with_lookup(variant, Arc::new(FsLookup))
    }

    /// Creates an empty loader with a custom symbol lookup.
    pub fn with_lookup(variant: LoaderVariant, lookup: Arc<dyn SymbolLookup>) -> Self {
        Self {
            variant,
            lookup,
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// The failure policy chosen at creation.
    pub fn variant(&self) -> LoaderVariant {
        self.variant
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a location to the end of the search path.
    pub fn add_location(&self, location: Location) -> Result<AddOutcome, LoaderStateError> {
        let mut state = self.lock();

        if state.frozen {
            return Err(LoaderStateError::Frozen { location });
        }

        if state.locations.contains(&location) {
            return match self.variant {
                LoaderVariant::Relaxed => {
                    log::trace!("Location '{}' already present, ignored.", location);
                    Ok(AddOutcome::AlreadyPresent)
                }
                LoaderVariant::Strict => Err(LoaderStateError::DuplicateLocation { location }),
            };
        }

        if self.variant == LoaderVariant::Strict {
            // Sorted so the reported symbol does not depend on hash order.
            let mut resolved: Vec<(&String, &usize)> = state.resolved.iter().collect();
            resolved.sort();
            if let Some((symbol, &index)) = resolved
                .into_iter()
                .find(|(symbol, _)| self.lookup.provides(&location, symbol))
            {
                let resolved_from = state.locations.get(index).cloned().unwrap_or_else(|| {
                    Location::new(format!("<location #{}>", index))
                });
                return Err(LoaderStateError::Shadowing {
                    location,
                    symbol: symbol.clone(),
                    resolved_from,
                });
            }
        }

        log::debug!("Appending location '{}' to the search path.", location);
        state.locations.push(location);
        Ok(AddOutcome::Appended)
    }

    /// Appends several locations in order, stopping at the first rejection.
    pub fn add_locations<I>(&self, locations: I) -> Result<usize, LoaderStateError>
    where
        I: IntoIterator<Item = Location>,
    {
        let mut appended = 0;
        for location in locations {
            if self.add_location(location)? == AddOutcome::Appended {
                appended += 1;
            }
        }
        Ok(appended)
    }

    /// A snapshot of the search path, in append order.
    pub fn current_locations(&self) -> Vec<Location> {
        self.lock().locations.clone()
    }

    /// Resolves a symbol to the first location providing it.
    /// A successful answer is cached for the lifetime of the loader.
    pub fn resolve(&self, symbol: &str) -> Option<Location> {
        let mut state = self.lock();
        if let Some(&index) = state.resolved.get(symbol) {
            return state.locations.get(index).cloned();
        }

        let index = state
            .locations
            .iter()
            .position(|location| self.lookup.provides(location, symbol))?;
        state.resolved.insert(symbol.to_string(), index);
        let location = state.locations.get(index).cloned();
        if let Some(found) = &location {
            log::trace!("Resolved '{}' from '{}'.", symbol, found);
        }
        location
    }

    /// Forbids any further append. Called once control has re-entered through
    /// the loader.
    pub fn freeze(&self) {
        self.lock().frozen = true;
    }

    /// Whether [`ModuleLoader::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }
}

/// How [`LoaderContext::install`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    /// No loader was installed; a fresh one now is.
    Installed,
    /// A loader of the requested variant was already installed and is reused.
    Reused,
    /// A loader of the other variant was installed. It was superseded by a new
    /// loader of the requested variant, seeded with its whole state.
    Replaced,
}

/// The slot carrying the active loader of an execution context.
#[derive(Debug, Default)]
pub struct LoaderContext {
    active: Mutex<Option<Arc<ModuleLoader>>>,
}

static PROCESS_CONTEXT: OnceLock<LoaderContext> = OnceLock::new();

impl LoaderContext {
    /// An empty context, independent of the process one.
    pub fn new() -> Self {
        Self::default()
    }

    /// The context shared by the whole process.
    pub fn process() -> &'static Self {
        PROCESS_CONTEXT.get_or_init(Self::new)
    }

    /// Installs a loader of the given variant that looks symbols up on the
    /// filesystem.
    pub fn install(&self, variant: LoaderVariant) -> (Arc<ModuleLoader>, Installation) {
        self.install_with_lookup(variant, Arc::new(FsLookup))
    }

    /// Installs a loader of the given variant. Idempotent: when a loader of the
    /// same variant is already active, it is returned untouched.
    pub fn install_with_lookup(
        &self,
        variant: LoaderVariant,
        lookup: Arc<dyn SymbolLookup>,
    ) -> (Arc<ModuleLoader>, Installation) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        match active.clone() {
            Some(existing) if existing.variant() == variant => {
                log::debug!("{:?} loader already installed, reusing it.", variant);
                (existing, Installation::Reused)
            }
            Some(existing) => {
                log::debug!(
                    "Replacing {:?} loader with a {:?} loader.",
                    existing.variant(),
                    variant
                );
                let replacement = ModuleLoader::with_lookup(variant, lookup);
                // The previous path, its resolved symbols and its frozen flag
                // carry over as-is, duplicates included.
                let carried = existing.lock().clone();
                *replacement.lock() = carried;
                let replacement = Arc::new(replacement);
                *active = Some(Arc::clone(&replacement));
                (replacement, Installation::Replaced)
            }
            None => {
                log::debug!("Installing {:?} loader.", variant);
                let loader = Arc::new(ModuleLoader::with_lookup(variant, lookup));
                *active = Some(Arc::clone(&loader));
                (loader, Installation::Installed)
            }
        }
    }

    /// The loader currently installed, if any.
    pub fn active(&self) -> Option<Arc<ModuleLoader>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Lookup backed by an explicit `(location, symbol)` table.
    struct TableLookup(HashSet<(String, String)>);

    impl TableLookup {
        fn new(entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self(
                entries
                    .iter()
                    .map(|(l, s)| (l.to_string(), s.to_string()))
                    .collect(),
            ))
        }
    }

    impl SymbolLookup for TableLookup {
        fn provides(&self, location: &Location, symbol: &str) -> bool {
            self.0
                .contains(&(location.to_string(), symbol.to_string()))
        }
    }

    fn loc(s: &str) -> Location {
        Location::new(s)
    }

    #[test]
    fn test_first_appended_location_wins() {
        let lookup = TableLookup::new(&[("l1", "a/Sym"), ("l2", "a/Sym")]);
        let loader = ModuleLoader::with_lookup(LoaderVariant::Strict, lookup);
        loader.add_location(loc("l1")).unwrap();
        loader.add_location(loc("l2")).unwrap();

        assert_eq!(loader.resolve("a/Sym"), Some(loc("l1")));
    }

    #[test]
    fn test_relaxed_ignores_duplicates() {
        let loader = ModuleLoader::new(LoaderVariant::Relaxed);
        assert_eq!(loader.add_location(loc("l1")).unwrap(), AddOutcome::Appended);
        assert_eq!(
            loader.add_location(loc("l1")).unwrap(),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(loader.current_locations(), vec![loc("l1")]);
    }

    #[test]
    fn test_strict_rejects_duplicates() {
        let loader = ModuleLoader::new(LoaderVariant::Strict);
        loader.add_location(loc("l1")).unwrap();
        let err = loader.add_location(loc("l1")).unwrap_err();
        assert_eq!(err, LoaderStateError::DuplicateLocation { location: loc("l1") });
        assert_eq!(loader.current_locations().len(), 1);
    }

    #[test]
    fn test_strict_rejects_shadowing_of_resolved_symbol() {
        let lookup = TableLookup::new(&[("l1", "Sym"), ("l2", "Sym"), ("l2", "Other")]);
        let loader = ModuleLoader::with_lookup(LoaderVariant::Strict, lookup);
        loader.add_location(loc("l1")).unwrap();
        assert_eq!(loader.resolve("Sym"), Some(loc("l1")));

        let err = loader.add_location(loc("l2")).unwrap_err();
        assert!(matches!(err, LoaderStateError::Shadowing { ref symbol, .. } if symbol == "Sym"));
        assert_eq!(loader.current_locations(), vec![loc("l1")]);
    }

    #[test]
    fn test_strict_allows_overlap_before_resolution() {
        let lookup = TableLookup::new(&[("l1", "Sym"), ("l2", "Sym")]);
        let loader = ModuleLoader::with_lookup(LoaderVariant::Strict, lookup);
        loader.add_location(loc("l1")).unwrap();
        // Nothing resolved yet, so nothing can be shadowed.
        loader.add_location(loc("l2")).unwrap();
        assert_eq!(loader.current_locations().len(), 2);
    }

    #[test]
    fn test_relaxed_resolution_is_stable_across_appends() {
        let lookup = TableLookup::new(&[("l2", "Sym"), ("l3", "Sym")]);
        let loader = ModuleLoader::with_lookup(LoaderVariant::Relaxed, lookup);
        loader.add_location(loc("l2")).unwrap();
        assert_eq!(loader.resolve("Sym"), Some(loc("l2")));

        loader.add_location(loc("l3")).unwrap();
        assert_eq!(loader.resolve("Sym"), Some(loc("l2")));
    }

    #[test]
    fn test_unresolved_symbols_are_not_cached() {
        let lookup = TableLookup::new(&[("l2", "Late")]);
        let loader = ModuleLoader::with_lookup(LoaderVariant::Strict, lookup);
        loader.add_location(loc("l1")).unwrap();
        assert_eq!(loader.resolve("Late"), None);

        loader.add_location(loc("l2")).unwrap();
        assert_eq!(loader.resolve("Late"), Some(loc("l2")));
    }

    #[test]
    fn test_frozen_loader_rejects_appends() {
        let loader = ModuleLoader::new(LoaderVariant::Relaxed);
        loader.add_location(loc("l1")).unwrap();
        loader.freeze();

        let err = loader.add_location(loc("l2")).unwrap_err();
        assert_eq!(err, LoaderStateError::Frozen { location: loc("l2") });
        assert!(loader.is_frozen());
    }

    #[test]
    fn test_fs_lookup_finds_files_in_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/Build.class"), b"").unwrap();

        let loader = ModuleLoader::new(LoaderVariant::Strict);
        loader.add_location(Location::new(dir.path())).unwrap();
        assert_eq!(
            loader.resolve("pkg/Build.class"),
            Some(Location::new(dir.path()))
        );
        assert_eq!(loader.resolve("pkg/Missing.class"), None);
    }

    #[test]
    fn test_context_install_is_idempotent() {
        let context = LoaderContext::new();
        let (first, how) = context.install(LoaderVariant::Strict);
        assert_eq!(how, Installation::Installed);
        first.add_location(loc("l1")).unwrap();

        let (second, how) = context.install(LoaderVariant::Strict);
        assert_eq!(how, Installation::Reused);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.current_locations(), vec![loc("l1")]);
    }

    #[test]
    fn test_context_replaces_mismatched_variant_keeping_locations() {
        let context = LoaderContext::new();
        let (strict, _) = context.install(LoaderVariant::Strict);
        strict.add_location(loc("l1")).unwrap();

        let (relaxed, how) = context.install(LoaderVariant::Relaxed);
        assert_eq!(how, Installation::Replaced);
        assert_eq!(relaxed.variant(), LoaderVariant::Relaxed);
        assert_eq!(relaxed.current_locations(), vec![loc("l1")]);
        assert!(Arc::ptr_eq(&context.active().unwrap(), &relaxed));
    }

    #[test]
    fn test_replacement_keeps_frozen_flag_and_resolved_symbols() {
        // --- Setup ---
        let context = LoaderContext::new();
        let table = TableLookup::new(&[("l1", "Sym"), ("l2", "Sym")]);
        let (strict, _) = context.install_with_lookup(LoaderVariant::Strict, table.clone());
        strict.add_location(loc("l1")).unwrap();
        assert_eq!(strict.resolve("Sym"), Some(loc("l1")));
        strict.freeze();

        // --- Execute ---
        let (relaxed, how) = context.install_with_lookup(LoaderVariant::Relaxed, table);

        // --- Assert ---
        assert_eq!(how, Installation::Replaced);
        assert!(relaxed.is_frozen());
        assert_eq!(
            relaxed.add_location(loc("l2")),
            Err(LoaderStateError::Frozen { location: loc("l2") })
        );
        assert_eq!(relaxed.resolve("Sym"), Some(loc("l1")));
    }

    #[test]
    fn test_replacement_keeps_shadowing_guard() {
        let context = LoaderContext::new();
        let table = TableLookup::new(&[("l1", "Sym"), ("l2", "Sym")]);
        let (relaxed, _) = context.install_with_lookup(LoaderVariant::Relaxed, table.clone());
        relaxed.add_location(loc("l1")).unwrap();
        relaxed.resolve("Sym");

        let (strict, _) = context.install_with_lookup(LoaderVariant::Strict, table);

        assert!(matches!(
            strict.add_location(loc("l2")),
            Err(LoaderStateError::Shadowing { ref symbol, .. }) if symbol == "Sym"
        ));
    }
}
