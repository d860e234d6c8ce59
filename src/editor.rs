use crate::conf::{Conf, Context, Directive, Item};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of [`Conf::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    Single(String),
    /// The last path segment matched a directive declared more than once.
    Many(Vec<String>),
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        !matches!(self, Lookup::NotFound)
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            Lookup::Single(v) => Some(v),
            _ => None,
        }
    }

    /// All values in declaration order (empty when not found).
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Lookup::NotFound => Vec::new(),
            Lookup::Single(v) => vec![v],
            Lookup::Many(vs) => vs,
        }
    }

    /// The value of the last declaration, i.e. the one nginx honours.
    pub fn last(self) -> Option<String> {
        self.into_vec().pop()
    }
}

/// A patch operation, modelled on JSON Patch but with nginx-specific ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Appends the directive, even if it's already declared.
    Add { path: String, value: String },
    /// Appends the directive only if it's not declared yet.
    Default { path: String, value: String },
    /// Removes every declaration of the directive in its context.
    Remove { path: String },
    /// Removes every declaration of the directive, then appends it.
    Set { path: String, value: String },
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Add {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn default(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Default {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn set(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Default { path, .. }
            | Self::Remove { path }
            | Self::Set { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("invalid path: {0:?} (must start with '/')")]
    InvalidPath(String),
    #[error("directive at {0:?} does not exist")]
    ParentNotFound(String),
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Child item indices leading from the root context to a directive.
/// The empty chain is the root context itself.
type Chain = Vec<usize>;

enum Target {
    NotFound,
    One(Chain),
    Many(Vec<Chain>),
}

fn split_path(path: &str) -> Result<Vec<&str>, PatchError> {
    if path.is_empty() || path == "/" {
        return Ok(Vec::new());
    }
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| PatchError::InvalidPath(path.to_string()))?;
    Ok(rest.split('/').collect())
}

fn directive_at<'a>(root: &'a Context, chain: &[usize]) -> Option<&'a Directive> {
    let (&last, parents) = chain.split_last()?;
    match context_at(root, parents)?.items.get(last)? {
        Item::Directive(d) => Some(d),
        Item::Comment(_) => None,
    }
}

/// The context reached by `chain`: the root, or the block of the directive
/// at `chain`. `None` when the chain ends on a scalar directive.
fn context_at<'a>(root: &'a Context, chain: &[usize]) -> Option<&'a Context> {
    let mut context = root;
    for &idx in chain {
        match context.items.get(idx)? {
            Item::Directive(d) => context = d.block.as_ref()?,
            Item::Comment(_) => return None,
        }
    }
    Some(context)
}

fn context_at_mut<'a>(root: &'a mut Context, chain: &[usize]) -> Option<&'a mut Context> {
    let mut context = root;
    for &idx in chain {
        match context.items.get_mut(idx)? {
            Item::Directive(d) => context = d.block.as_mut()?,
            Item::Comment(_) => return None,
        }
    }
    Some(context)
}

fn resolve(root: &Context, segments: &[&str]) -> Target {
    let mut current = Target::One(Chain::new());
    let mut after_name = false;

    for segment in segments {
        if let Ok(index) = segment.parse::<usize>() {
            current = match current {
                Target::Many(all) if after_name => match all.into_iter().nth(index) {
                    Some(chain) => Target::One(chain),
                    None => Target::NotFound,
                },
                Target::One(chain) if after_name && index == 0 => Target::One(chain),
                _ => Target::NotFound,
            };
            after_name = false;
            continue;
        }

        // Descending through a repeated directive picks its first occurrence.
        let chain = match current {
            Target::NotFound => return Target::NotFound,
            Target::One(chain) => chain,
            Target::Many(all) => match all.into_iter().next() {
                Some(chain) => chain,
                None => return Target::NotFound,
            },
        };
        let Some(context) = context_at(root, &chain) else {
            return Target::NotFound;
        };

        let mut matches: Vec<Chain> = context
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| matches!(item, Item::Directive(d) if d.name == *segment))
            .map(|(idx, _)| {
                let mut c = chain.clone();
                c.push(idx);
                c
            })
            .collect();

        current = match matches.len() {
            0 => Target::NotFound,
            1 => Target::One(matches.remove(0)),
            _ => Target::Many(matches),
        };
        after_name = true;
    }

    current
}

// ---------------------------------------------------------------------------
// Conf API
// ---------------------------------------------------------------------------

impl Conf {
    /// Returns the value of the directive at `path`.
    ///
    /// Paths look like JSON Pointers: `/http/server/1/listen` points to the
    /// `listen` directive(s) in the second `server` block of the `http` block.
    /// A numeric segment selects one of several same-named siblings.
    ///
    /// - A directive that is not declared yields [`Lookup::NotFound`].
    /// - A block directive without arguments (e.g. `server`) yields an empty string.
    /// - An intermediate directive declared multiple times without an index in
    ///   the path resolves to its first declaration.
    /// - A last segment matching several declarations yields [`Lookup::Many`].
    /// - `/` yields the root context as an empty string.
    pub fn get(&self, path: &str) -> Result<Lookup, PatchError> {
        let segments = split_path(path)?;
        let values = |chain: &Chain| {
            directive_at(&self.root, chain)
                .map(|d| d.value.clone())
                .unwrap_or_default()
        };
        Ok(match resolve(&self.root, &segments) {
            Target::NotFound => Lookup::NotFound,
            Target::One(chain) => Lookup::Single(values(&chain)),
            Target::Many(chains) => Lookup::Many(chains.iter().map(values).collect()),
        })
    }

    /// Returns the context at `path` (the root for `/`), following the same
    /// rules as [`Conf::get`]. `None` for scalar directives.
    pub fn context(&self, path: &str) -> Result<Option<&Context>, PatchError> {
        let segments = split_path(path)?;
        Ok(match resolve(&self.root, &segments) {
            Target::NotFound => None,
            Target::One(chain) => context_at(&self.root, &chain),
            Target::Many(chains) => chains
                .first()
                .and_then(|chain| context_at(&self.root, chain)),
        })
    }

    /// Applies the operations in order. Operations applied before a failing
    /// one stay applied.
    pub fn apply_patch<'a, I>(&mut self, patch: I) -> Result<&mut Self, PatchError>
    where
        I: IntoIterator<Item = &'a PatchOperation>,
    {
        for op in patch {
            self.apply_operation(op)?;
        }
        Ok(self)
    }

    fn apply_operation(&mut self, op: &PatchOperation) -> Result<(), PatchError> {
        let segments = split_path(op.path())?;
        let Some((&name, parent_segments)) = segments.split_last() else {
            return Err(PatchError::InvalidPath(op.path().to_string()));
        };
        let parent_path = format!("/{}", parent_segments.join("/"));

        let parent_chain = match resolve(&self.root, parent_segments) {
            Target::One(chain) => Some(chain),
            Target::Many(chains) => chains.into_iter().next(),
            Target::NotFound => None,
        };
        let exists_already = matches!(op, PatchOperation::Default { .. })
            && !matches!(resolve(&self.root, &segments), Target::NotFound);

        let parent =
            parent_chain.and_then(|chain| context_at_mut(&mut self.root, &chain));
        let Some(parent) = parent else {
            return match op {
                PatchOperation::Remove { .. } => Ok(()),
                _ => Err(PatchError::ParentNotFound(parent_path)),
            };
        };

        match op {
            PatchOperation::Add { value, .. } => parent.push(Directive::scalar(name, value)),
            PatchOperation::Default { value, .. } => {
                if !exists_already {
                    parent.push(Directive::scalar(name, value));
                }
            }
            PatchOperation::Remove { .. } => {
                parent.remove_all(name);
            }
            PatchOperation::Set { value, .. } => {
                parent.remove_all(name);
                parent.push(Directive::scalar(name, value));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
