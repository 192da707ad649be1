//! Radix tree node implementation.
//!
//! Each node is one template segment. Literal children are kept sorted for
//! binary search; placeholder children keep registration order, which is
//! the tie-breaker when two placeholders could accept the same segment.

use crate::methods::MethodSet;
use crate::params::Params;
use crate::template::Segment;
use crate::Protocol;

/// A route endpoint stored at a tree leaf.
#[derive(Debug, Clone)]
pub struct Endpoint<T> {
    /// Methods this endpoint accepts.
    pub methods: MethodSet,
    /// Protocol kind the endpoint serves.
    pub protocol: Protocol,
    /// Caller payload, typically a route id.
    pub value: T,
}

/// Methods taken away from an older endpoint by a newer registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Displaced<T> {
    /// The older endpoint's payload.
    pub value: T,
    /// Methods it no longer serves.
    pub methods: MethodSet,
    /// True when the older endpoint lost every method and was removed.
    pub removed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Node<T> {
    key: String,
    segment: Option<Segment>,
    endpoints: Vec<Endpoint<T>>,
    static_children: Vec<Node<T>>,
    param_children: Vec<Node<T>>,
}

impl<T: Clone> Node<T> {
    pub(crate) fn root() -> Self {
        Self {
            key: String::new(),
            segment: None,
            endpoints: Vec::new(),
            static_children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn from_segment(segment: &Segment) -> Self {
        Self {
            key: segment.key(),
            segment: Some(segment.clone()),
            endpoints: Vec::new(),
            static_children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    /// Inserts an endpoint under `segments`.
    ///
    /// An identical template registered again for the same protocol takes
    /// over the overlapping methods from the older endpoints at that leaf.
    pub(crate) fn insert(&mut self, segments: &[Segment], endpoint: Endpoint<T>) -> Vec<Displaced<T>> {
        let Some((segment, rest)) = segments.split_first() else {
            return self.attach(endpoint);
        };

        let key = segment.key();
        let child = match segment {
            Segment::Literal(_) => {
                match self
                    .static_children
                    .binary_search_by(|c| c.key.as_str().cmp(key.as_str()))
                {
                    Ok(i) => &mut self.static_children[i],
                    Err(i) => {
                        self.static_children.insert(i, Node::from_segment(segment));
                        &mut self.static_children[i]
                    }
                }
            }
            Segment::Param { .. } => {
                if let Some(i) = self.param_children.iter().position(|c| c.key == key) {
                    &mut self.param_children[i]
                } else {
                    self.param_children.push(Node::from_segment(segment));
                    let last = self.param_children.len() - 1;
                    &mut self.param_children[last]
                }
            }
        };
        child.insert(rest, endpoint)
    }

    fn attach(&mut self, endpoint: Endpoint<T>) -> Vec<Displaced<T>> {
        let mut displaced = Vec::new();
        for existing in &mut self.endpoints {
            if existing.protocol != endpoint.protocol || !existing.methods.overlaps(&endpoint.methods) {
                continue;
            }
            let mut lost = MethodSet::new();
            for m in endpoint.methods.iter() {
                if existing.methods.remove(m) {
                    lost.insert(m.clone());
                }
            }
            displaced.push(Displaced {
                value: existing.value.clone(),
                methods: lost,
                removed: existing.methods.is_empty(),
            });
        }
        self.endpoints.retain(|e| !e.methods.is_empty());
        self.endpoints.push(endpoint);
        displaced
    }

    /// Collects every endpoint whose template matches `segments`, in
    /// priority order: literals, then placeholders, then catch-alls.
    pub(crate) fn collect<'a>(
        &'a self,
        segments: &[String],
        params: &mut Params,
        out: &mut Vec<(&'a Endpoint<T>, Params)>,
    ) {
        let Some((first, rest)) = segments.split_first() else {
            for endpoint in &self.endpoints {
                out.push((endpoint, params.clone()));
            }
            return;
        };

        if let Ok(i) = self
            .static_children
            .binary_search_by(|c| c.key.as_str().cmp(first.as_str()))
        {
            self.static_children[i].collect(rest, params, out);
        }

        for child in self.param_children.iter().filter(|c| !c.is_catch_all()) {
            let Some(Segment::Param { name, converter, .. }) = &child.segment else {
                continue;
            };
            // A failed conversion only rules out this branch.
            if let Ok(value) = converter.convert(first) {
                let mark = params.len();
                params.push(name.clone(), value);
                child.collect(rest, params, out);
                params.truncate(mark);
            }
        }

        for child in self.param_children.iter().filter(|c| c.is_catch_all()) {
            let Some(Segment::Param { name, converter, .. }) = &child.segment else {
                continue;
            };
            // A slash decoded from `%2F` inside a segment stays escaped, so
            // it is not mistaken for a separator.
            let joined = segments
                .iter()
                .map(|s| s.replace('/', "%2F"))
                .collect::<Vec<_>>()
                .join("/");
            if let Ok(value) = converter.convert(&joined) {
                let mark = params.len();
                params.push(name.clone(), value);
                child.collect(&[], params, out);
                params.truncate(mark);
            }
        }
    }

    fn is_catch_all(&self) -> bool {
        matches!(&self.segment, Some(Segment::Param { converter, .. }) if converter.is_catch_all())
    }
}
