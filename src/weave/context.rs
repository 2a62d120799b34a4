use super::{Error, Settings};
use crate::cil::{self, MethodBody, MethodData, Operand, Writer};
use crate::util::RefId;
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

type MethodKey<'g> = RefId<'g, MethodData<'g>>;

/// Everything one weaving run works on
///
/// Holds the method bodies being rewritten, and the registry of methods that have already been
/// rewritten during this run. Nothing here outlives the run: a fresh context starts with an empty
/// registry.
///
/// Edits are transactional per member. The first time a body is handed out while weaving a
/// member, a copy of it is kept; if weaving the member fails, all those copies are put back.
pub struct WeavingContext<'g> {
    settings: Settings,
    bodies: HashMap<MethodKey<'g>, MethodBody<'g>>,

    /// Methods rewritten by a member that wove successfully
    rewritten: HashSet<MethodKey<'g>>,

    /// Bodies as they were before the member currently being woven touched them
    snapshots: HashMap<MethodKey<'g>, MethodBody<'g>>,
}

impl<'g> WeavingContext<'g> {
    pub fn new(settings: Settings) -> WeavingContext<'g> {
        WeavingContext {
            settings,
            bodies: HashMap::new(),
            rewritten: HashSet::new(),
            snapshots: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Register the body of a method, returning the body it replaces (if any)
    pub fn add_body(&mut self, body: MethodBody<'g>) -> Option<MethodBody<'g>> {
        self.bodies.insert(RefId(body.method), body)
    }

    pub fn body(&self, method: &'g MethodData<'g>) -> Option<&MethodBody<'g>> {
        self.bodies.get(&RefId(method))
    }

    /// Take every body back out, eg. to hand them to the host for writing
    pub fn into_bodies(self) -> Vec<MethodBody<'g>> {
        self.bodies.into_values().collect()
    }

    /// Writer over the body of a method, configured from the run's settings
    ///
    /// This also records the method as rewritten (for good, once the current member finishes
    /// weaving successfully).
    pub fn writer<'c>(&'c mut self, method: &'g MethodData<'g>) -> Result<Writer<'c, 'g>, Error> {
        let key = RefId(method);
        let body = match self.bodies.get_mut(&key) {
            Some(body) => body,
            None => return Err(Error::MissingBody(format!("{:?}", method))),
        };
        if !self.snapshots.contains_key(&key) {
            trace!("snapshot {:?} before editing it", method);
            self.snapshots.insert(key, body.clone());
        }
        Ok(Writer::with_settings(body, &self.settings))
    }

    /// Has the method been rewritten earlier in this run?
    ///
    /// Markers use this to avoid rewriting a body twice (eg. when two parameters of the same
    /// method carry the same marker).
    pub fn is_rewritten(&self, method: &'g MethodData<'g>) -> bool {
        let key = RefId(method);
        self.rewritten.contains(&key) || self.snapshots.contains_key(&key)
    }

    /// Methods rewritten so far, in no particular order
    pub fn rewritten(&self) -> impl Iterator<Item = &'g MethodData<'g>> + '_ {
        self.rewritten.iter().map(|key| key.0)
    }

    /// Start weaving a member
    pub(super) fn begin_member(&mut self) {
        self.snapshots.clear();
    }

    /// Keep the edits made while weaving the current member
    ///
    /// Fails (without keeping anything) if one of the touched bodies still has a structured block
    /// open, or a branch with no target.
    pub(super) fn commit_member(&mut self) -> Result<(), Error> {
        for key in self.snapshots.keys() {
            if let Some(body) = self.bodies.get(key) {
                if body.open_blocks() > 0 {
                    return Err(Error::Editing(cil::Error::UnbalancedStructure {
                        open_blocks: body.open_blocks(),
                    }));
                }
                if let Some(node) = body
                    .instructions
                    .iter()
                    .find(|node| matches!(node.instruction.operand, Operand::Branch(None)))
                {
                    return Err(Error::Editing(cil::Error::UnresolvedBranch(node.id)));
                }
            }
        }
        self.rewritten.extend(self.snapshots.drain().map(|(key, _)| key));
        Ok(())
    }

    /// Undo every edit made while weaving the current member
    pub(super) fn rollback_member(&mut self) {
        for (key, body) in self.snapshots.drain() {
            debug!("rolling back {:?}", key.0);
            self.bodies.insert(key, body);
        }
    }
}
