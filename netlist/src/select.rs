use std::collections::{BTreeMap, BTreeSet};

/// Which modules, cells, and wires a pass invocation may touch. The default
/// selection covers the whole design; restricting to module names (and
/// optionally to named members within a module) narrows it.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    modules: Option<BTreeSet<String>>,
    members: BTreeMap<String, BTreeSet<String>>,
}

impl Selection {
    pub fn all() -> Selection {
        Default::default()
    }

    pub fn modules<I, S>(names: I) -> Selection
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection {
            modules: Some(names.into_iter().map(Into::into).collect()),
            members: BTreeMap::new(),
        }
    }

    pub fn add_module(&mut self, name: impl Into<String>) {
        self.modules.get_or_insert_with(BTreeSet::new).insert(name.into());
    }

    /// Select a single wire or cell; also selects its module.
    pub fn add_member(&mut self, module: impl Into<String>, member: impl Into<String>) {
        let module = module.into();
        self.add_module(module.clone());
        self.members.entry(module).or_default().insert(member.into());
    }

    pub fn module(&self, name: &str) -> bool {
        self.modules.as_ref().map_or(true, |set| set.contains(name))
    }

    fn member(&self, module: &str, name: &str) -> bool {
        self.module(module)
            && self.members.get(module).map_or(true, |set| set.contains(name))
    }

    pub fn cell(&self, module: &str, name: &str) -> bool {
        self.member(module, name)
    }

    pub fn wire(&self, module: &str, name: &str) -> bool {
        self.member(module, name)
    }
}
