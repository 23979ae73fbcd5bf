use crate::error::{Result, StemmaError};
use crate::gedcom;
use crate::store::traits::Store;
use crate::types::{Favorite, PendingChange, Record, Xref};
use chrono::Utc;
use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable, TableDefinition,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Table definitions. Records are stored as their raw line-oriented
// bodies, keyed by (tree, xref); everything else hangs off the same key
// shape.
const RECORDS: TableDefinition<(&str, &str), &str> = TableDefinition::new("records");
const PENDING: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("pending");
const HITS: TableDefinition<(&str, &str, &str), u64> = TableDefinition::new("hits");
const FAVORITES: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("favorites");
const ACCOUNT_LINKS: TableDefinition<(&str, &str), &str> = TableDefinition::new("account_links");

// Inbound-reference index: (tree, target xref) -> referencing xref.
// Rebuilt incrementally from committed bodies on every write.
const LINKS: MultimapTableDefinition<(&str, &str), &str> = MultimapTableDefinition::new("links");

// Metadata table
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_VERSION_KEY: &str = "schema_version";
const FAVORITE_SEQ_KEY: &str = "favorites:next_seq";

/// Redb-based record store.
pub struct RedbStore {
    db: Arc<Database>,
    #[allow(dead_code)]
    path: PathBuf,
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StemmaError::Validation(format!("Failed to create directory: {}", e))
            })?;
        }

        let is_new = !path.exists();
        let db = Database::create(&path)?;

        if !is_new {
            Self::check_schema_version(&db)?;
        }

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(RECORDS)?;
            let _ = write_txn.open_table(PENDING)?;
            let _ = write_txn.open_table(HITS)?;
            let _ = write_txn.open_table(FAVORITES)?;
            let _ = write_txn.open_table(ACCOUNT_LINKS)?;
            let _ = write_txn.open_multimap_table(LINKS)?;
            let mut meta = write_txn.open_table(META)?;
            if is_new {
                meta.insert(
                    SCHEMA_VERSION_KEY,
                    CURRENT_SCHEMA_VERSION.to_string().as_bytes(),
                )?;
            }
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Check schema version. Returns an error if migration is needed.
    fn check_schema_version(db: &Database) -> Result<()> {
        let read_txn = db.begin_read()?;
        let version = {
            let table = read_txn.open_table(META).ok();
            table
                .and_then(|t| {
                    t.get(SCHEMA_VERSION_KEY).ok().flatten().and_then(|v| {
                        std::str::from_utf8(v.value())
                            .ok()
                            .and_then(|s| s.parse::<u32>().ok())
                    })
                })
                .unwrap_or(CURRENT_SCHEMA_VERSION)
        };

        if version == CURRENT_SCHEMA_VERSION {
            Ok(())
        } else {
            Err(StemmaError::Validation(format!(
                "Store schema v{} does not match this binary's v{}.",
                version, CURRENT_SCHEMA_VERSION
            )))
        }
    }

    /// The store's file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Require the header of a body being written to carry the id it is
    /// stored under.
    fn check_header(xref: &Xref, body: &str) -> Result<()> {
        match gedcom::header(body) {
            Some((id, _)) if id == xref.as_str() => Ok(()),
            Some((id, _)) => Err(StemmaError::Malformed(format!(
                "Header id {} does not match {}",
                id, xref
            ))),
            None => Err(StemmaError::Malformed(format!(
                "Record {} has no parsable header line",
                xref
            ))),
        }
    }

    /// Drop any change-metadata block and append a fresh one carrying
    /// today's date. Applied on every committed write.
    fn refresh_change_metadata(body: &str) -> String {
        let (preamble, blocks) = gedcom::split_blocks(body);
        let mut kept: Vec<String> = blocks
            .into_iter()
            .filter(|b| {
                gedcom::line_tag(b.lines().next().unwrap_or("")) != Some(gedcom::CHANGE_TAG)
            })
            .collect();
        let stamp = Utc::now().format("%d %b %Y").to_string().to_uppercase();
        kept.push(format!("1 {}\n2 DATE {}", gedcom::CHANGE_TAG, stamp));
        gedcom::join_blocks(&preamble, &kept)
    }

    fn read_pending(&self, tree: &str, xref: &Xref) -> Result<Option<PendingChange>> {
        let read_txn = self.db.begin_read()?;
        let pending = read_txn.open_table(PENDING)?;
        match pending.get((tree, xref.as_str()))? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Commit a replacement body: refresh change metadata, replace the
    /// stored body, reindex outbound references, clear any staged edit.
    fn commit_body(&self, tree: &str, xref: &Xref, body: &str) -> Result<()> {
        Self::check_header(xref, body)?;
        let stamped = Self::refresh_change_metadata(body);

        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS)?;
            let old_body = records
                .get((tree, xref.as_str()))?
                .map(|g| g.value().to_string())
                .ok_or_else(|| StemmaError::RecordNotFound(xref.to_string()))?;
            records.insert((tree, xref.as_str()), stamped.as_str())?;

            let mut links = write_txn.open_multimap_table(LINKS)?;
            for target in gedcom::pointer_targets(&old_body) {
                links.remove((tree, target.as_str()), xref.as_str())?;
            }
            for target in gedcom::pointer_targets(&stamped) {
                links.insert((tree, target.as_str()), xref.as_str())?;
            }

            let mut pending = write_txn.open_table(PENDING)?;
            pending.remove((tree, xref.as_str()))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn stage(&self, tree: &str, xref: &Xref, change: &PendingChange) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let records = write_txn.open_table(RECORDS)?;
            if records.get((tree, xref.as_str()))?.is_none() {
                return Err(StemmaError::RecordNotFound(xref.to_string()));
            }
            let bytes = bincode::serialize(change)?;
            let mut pending = write_txn.open_table(PENDING)?;
            pending.insert((tree, xref.as_str()), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl Store for RedbStore {
    fn create_record(&self, tree: &str, xref: &Xref, body: &str) -> Result<()> {
        Self::check_header(xref, body)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS)?;
            if records.get((tree, xref.as_str()))?.is_some() {
                return Err(StemmaError::DuplicateRecord(xref.to_string()));
            }
            records.insert((tree, xref.as_str()), body)?;

            let mut links = write_txn.open_multimap_table(LINKS)?;
            for target in gedcom::pointer_targets(body) {
                links.insert((tree, target.as_str()), xref.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn resolve(&self, tree: &str, xref: &Xref) -> Result<Option<Record>> {
        let body = {
            let read_txn = self.db.begin_read()?;
            let records = read_txn.open_table(RECORDS)?;
            match records.get((tree, xref.as_str()))? {
                Some(guard) => guard.value().to_string(),
                None => return Ok(None),
            }
        };
        let mut record = Record::new(tree, xref.clone(), body);
        record.pending = self.read_pending(tree, xref)?;
        Ok(Some(record))
    }

    fn write_record(&self, tree: &str, xref: &Xref, body: &str, auto_approve: bool) -> Result<()> {
        if auto_approve {
            self.commit_body(tree, xref, body)
        } else {
            Self::check_header(xref, body)?;
            self.stage(tree, xref, &PendingChange::Replace(body.to_string()))
        }
    }

    fn delete_record(&self, tree: &str, xref: &Xref) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut records = write_txn.open_table(RECORDS)?;
            let old_body = records
                .remove((tree, xref.as_str()))?
                .map(|g| g.value().to_string())
                .ok_or_else(|| StemmaError::RecordNotFound(xref.to_string()))?;

            let mut links = write_txn.open_multimap_table(LINKS)?;
            for target in gedcom::pointer_targets(&old_body) {
                links.remove((tree, target.as_str()), xref.as_str())?;
            }

            let mut pending = write_txn.open_table(PENDING)?;
            pending.remove((tree, xref.as_str()))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn stage_deletion(&self, tree: &str, xref: &Xref) -> Result<()> {
        self.stage(tree, xref, &PendingChange::Delete)
    }

    fn accept_pending(&self, tree: &str, xref: &Xref) -> Result<()> {
        match self.read_pending(tree, xref)? {
            Some(PendingChange::Replace(body)) => self.commit_body(tree, xref, &body),
            Some(PendingChange::Delete) => self.delete_record(tree, xref),
            None => Err(StemmaError::Validation(format!(
                "No pending change for record {}",
                xref
            ))),
        }
    }

    fn referencing_xrefs(&self, tree: &str, target: &Xref) -> Result<Vec<Xref>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_multimap_table(LINKS)?;

        let mut sources = Vec::new();
        for guard in links.get((tree, target.as_str()))? {
            sources.push(Xref::new(guard?.value())?);
        }
        // Deterministic processing order for notices.
        sources.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(sources)
    }

    fn usage_counts(&self, tree: &str, xrefs: &[Xref]) -> Result<HashMap<String, u64>> {
        let read_txn = self.db.begin_read()?;
        let hits = read_txn.open_table(HITS)?;

        let mut sums: HashMap<String, u64> = HashMap::new();
        for item in hits.iter()? {
            let (key, count) = item?;
            let (t, page, xref) = key.value();
            if t == tree && xrefs.iter().any(|x| x.as_str() == xref) {
                *sums.entry(page.to_string()).or_insert(0) += count.value();
            }
        }
        Ok(sums)
    }

    fn set_usage_count(&self, tree: &str, page: &str, xref: &Xref, count: u64) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut hits = write_txn.open_table(HITS)?;
            hits.insert((tree, page, xref.as_str()), count)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn delete_usage_counts(&self, tree: &str, xref: &Xref) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut hits = write_txn.open_table(HITS)?;
            let mut doomed: Vec<String> = Vec::new();
            for item in hits.iter()? {
                let (key, _) = item?;
                let (t, page, x) = key.value();
                if t == tree && x == xref.as_str() {
                    doomed.push(page.to_string());
                }
            }
            for page in doomed {
                hits.remove((tree, page.as_str(), xref.as_str()))?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn bump_usage_count(&self, tree: &str, page: &str, xref: &Xref) -> Result<u64> {
        let write_txn = self.db.begin_write()?;
        let next = {
            let mut hits = write_txn.open_table(HITS)?;
            let current = hits
                .get((tree, page, xref.as_str()))?
                .map(|g| g.value())
                .unwrap_or(0);
            let next = current + 1;
            hits.insert((tree, page, xref.as_str()), next)?;
            next
        };
        write_txn.commit()?;
        Ok(next)
    }

    fn add_favorite(&self, tree: &str, owner: &str, xref: &Xref) -> Result<()> {
        let favorite = Favorite {
            owner: owner.to_string(),
            xref: xref.clone(),
        };
        let bytes = bincode::serialize(&favorite)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META)?;
            let seq = meta
                .get(FAVORITE_SEQ_KEY)?
                .map(|v| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(v.value());
                    u64::from_le_bytes(raw)
                })
                .unwrap_or(0);
            meta.insert(FAVORITE_SEQ_KEY, (seq + 1).to_le_bytes().as_slice())?;

            let mut favorites = write_txn.open_table(FAVORITES)?;
            favorites.insert((tree, seq), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn favorites(&self, tree: &str) -> Result<Vec<Favorite>> {
        let read_txn = self.db.begin_read()?;
        let favorites = read_txn.open_table(FAVORITES)?;

        let mut out = Vec::new();
        for item in favorites.iter()? {
            let (key, value) = item?;
            if key.value().0 == tree {
                out.push(bincode::deserialize(value.value())?);
            }
        }
        Ok(out)
    }

    fn repoint_favorites(&self, tree: &str, from: &Xref, to: &Xref) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut favorites = write_txn.open_table(FAVORITES)?;
            let mut updates: Vec<(u64, Favorite)> = Vec::new();
            for item in favorites.iter()? {
                let (key, value) = item?;
                let (t, seq) = key.value();
                if t != tree {
                    continue;
                }
                let favorite: Favorite = bincode::deserialize(value.value())?;
                if favorite.xref == *from {
                    updates.push((
                        seq,
                        Favorite {
                            owner: favorite.owner,
                            xref: to.clone(),
                        },
                    ));
                }
            }
            for (seq, favorite) in updates {
                let bytes = bincode::serialize(&favorite)?;
                favorites.insert((tree, seq), bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn set_account_link(&self, tree: &str, user: &str, xref: &Xref) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNT_LINKS)?;
            table.insert((tree, user), xref.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn account_link(&self, tree: &str, user: &str) -> Result<Option<Xref>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNT_LINKS)?;
        match table.get((tree, user))? {
            Some(guard) => Ok(Some(Xref::new(guard.value())?)),
            None => Ok(None),
        }
    }

    fn repoint_account_links(&self, tree: &str, from: &Xref, to: &Xref) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNT_LINKS)?;
            let mut users: Vec<String> = Vec::new();
            for item in table.iter()? {
                let (key, value) = item?;
                let (t, user) = key.value();
                if t == tree && value.value() == from.as_str() {
                    users.push(user.to_string());
                }
            }
            for user in users {
                table.insert((tree, user.as_str()), to.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}
