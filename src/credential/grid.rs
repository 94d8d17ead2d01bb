//! Grid instance: one shuffled population of images for a single enrollment or
//! verification attempt, together with its selection state.

use rand::seq::SliceRandom;
use tracing::debug;

use super::{
    codec, CredentialDigest, ImageReference, RequiredCount, Selection, SelectionError,
    ToggleOutcome,
};
use crate::pipeline::GenerationResult;

#[derive(Clone, Debug)]
pub struct Grid {
    cells: Vec<ImageReference>,
    selection: Selection,
}

impl Grid {
    /// Build a grid from a pipeline result, shuffled for display.
    #[must_use]
    pub fn new(result: GenerationResult, required: RequiredCount) -> Self {
        let mut grid = Self {
            cells: result.into_images(),
            selection: Selection::new(required),
        };
        grid.shuffle();
        grid
    }

    /// Display order of the cells.
    #[must_use]
    pub fn cells(&self) -> &[ImageReference] {
        &self.cells
    }

    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Toggle an image shown in this grid.
    ///
    /// Cells sharing a reference are the same image for selection purposes.
    ///
    /// # Errors
    /// Returns `SelectionError::UnknownImage` for references not in the grid.
    pub fn toggle(&mut self, image: &str) -> Result<ToggleOutcome, SelectionError> {
        if !self.cells.iter().any(|cell| cell == image) {
            return Err(SelectionError::UnknownImage);
        }
        Ok(self.selection.toggle(image))
    }

    /// Show the same images in a new random order and start the pick over.
    pub fn reshuffle(&mut self) {
        self.shuffle();
        self.selection.reset();
    }

    /// Replace the images (regenerate action) and start the pick over.
    pub fn regenerate(&mut self, result: GenerationResult) {
        self.cells = result.into_images();
        self.reshuffle();
    }

    /// Finalize the pick and commit it for storage.
    ///
    /// # Errors
    /// Returns `SelectionError::Incomplete` while the pick is not complete.
    pub fn enroll(&self) -> Result<CredentialDigest, SelectionError> {
        let selection = self.selection.finalize()?;
        Ok(codec::commit(&selection))
    }

    /// Finalize the pick and compare it with the stored digest.
    ///
    /// A mismatch is a normal negative outcome: it returns `Ok(false)` and resets
    /// the selection so the user can try again on the same grid.
    ///
    /// # Errors
    /// Returns `SelectionError::Incomplete` while the pick is not complete.
    pub fn submit_verification(&mut self, stored: &CredentialDigest) -> Result<bool, SelectionError> {
        let selection = self.selection.finalize()?;
        let verified = codec::commit(&selection).matches(stored);
        if !verified {
            debug!("image sequence mismatch, selection reset");
            self.selection.reset();
        }
        Ok(verified)
    }

    fn shuffle(&mut self) {
        self.cells.shuffle(&mut rand::thread_rng());
    }
}
