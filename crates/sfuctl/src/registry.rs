/// Children of an entity keyed by id, iterated in insertion order.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Insert or replace the child with `id`.
    pub fn insert(&mut self, id: String, child: T) {
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some(entry) => entry.1 = child,
            None => self.entries.push((id, child)),
        }
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let pos = self.entries.iter().position(|(k, _)| k == id)?;
        Some(self.entries.remove(pos).1)
    }

    /// Remove every child, returning them in insertion order.
    pub fn take(&mut self) -> Vec<T> {
        self.entries.drain(..).map(|(_, v)| v).collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}
