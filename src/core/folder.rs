/// Maps a URL path onto its leading `depth` segments
#[derive(Debug, Clone, Copy)]
pub struct FolderClassifier {
    depth: usize,
}

impl FolderClassifier {
    /// `depth == 0` keeps every segment
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    /// `/atleta/profilo/index.php` at depth 1 is `/atleta`.
    ///
    /// Segments are whatever follows the first `/`-separated token, so a relative path loses its
    /// first token and a trailing slash contributes an empty last segment.
    pub fn classify(&self, path: &str) -> String {
        let components: Vec<&str> = path.split('/').skip(1).collect();

        let take = if self.depth == 0 || components.len() < self.depth {
            components.len()
        } else {
            self.depth
        };

        let mut folder = String::new();
        for component in &components[..take] {
            folder.push('/');
            folder.push_str(component);
        }
        folder
    }
}
