use anyhow::Result;

use crate::host::HostDocument;

/// Scoped host transaction. Dropping it without [`commit`](Self::commit)
/// rolls the transaction back.
pub struct HostTransaction<'a> {
    document: &'a mut dyn HostDocument,
    name: String,
    open: bool,
}

impl<'a> HostTransaction<'a> {
    pub fn start(document: &'a mut dyn HostDocument, name: &str) -> Result<Self> {
        document.start_transaction(name)?;
        tracing::trace!(transaction = name, "started host transaction");
        Ok(Self {
            document,
            name: name.to_string(),
            open: true,
        })
    }

    pub fn document(&mut self) -> &mut dyn HostDocument {
        &mut *self.document
    }

    /// A failed commit leaves the guard open, so it is rolled back on drop.
    pub fn commit(mut self) -> Result<()> {
        self.document.commit_transaction(&self.name)?;
        self.open = false;
        Ok(())
    }
}

impl Drop for HostTransaction<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(err) = self.document.rollback_transaction(&self.name) {
            tracing::error!(
                transaction = %self.name,
                error = %format!("{err:#}"),
                "failed to roll back host transaction"
            );
        }
    }
}

/// Runs `run` inside a transaction that is committed on success and rolled
/// back on error or panic.
pub fn with_transaction<T, F>(document: &mut dyn HostDocument, name: &str, run: F) -> Result<T>
where
    F: FnOnce(&mut dyn HostDocument) -> Result<T>,
{
    let mut transaction = HostTransaction::start(document, name)?;
    let value = run(transaction.document())?;
    transaction.commit()?;
    Ok(value)
}
