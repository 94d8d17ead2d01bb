//! Ordered image selection state machine.
//!
//! A selection grows by toggling images. Toggling a selected image removes it
//! and the images after it move up one position, so positions stay contiguous
//! (`1..=len`). Toggling a new image once the selection is full is ignored.

use thiserror::Error;

use super::{ImageReference, RequiredCount};

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("select {missing} more image(s) to complete the sequence")]
    Incomplete { missing: usize },
    #[error("image count must be 4 or 6, got {0}")]
    InvalidCount(i64),
    #[error("expected {expected} images, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("image selected more than once at position {position}")]
    Duplicate { position: usize },
    #[error("image reference at position {position} is empty")]
    EmptyImage { position: usize },
    #[error("image is not part of this grid")]
    UnknownImage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionState {
    Empty,
    Partial(usize),
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Appended at this 1-based position.
    Selected(usize),
    Deselected,
    /// Selection already full and the image was not part of it.
    Ignored,
}

/// Interactive build-up of an ordered selection for one grid instance.
#[derive(Clone, Debug)]
pub struct Selection {
    required: RequiredCount,
    images: Vec<ImageReference>,
}

impl Selection {
    #[must_use]
    pub fn new(required: RequiredCount) -> Self {
        Self {
            required,
            images: Vec::with_capacity(required.get()),
        }
    }

    pub fn toggle(&mut self, image: &str) -> ToggleOutcome {
        if let Some(index) = self.images.iter().position(|selected| selected == image) {
            self.images.remove(index);
            return ToggleOutcome::Deselected;
        }

        if self.images.len() >= self.required.get() {
            return ToggleOutcome::Ignored;
        }

        self.images.push(image.to_string());
        ToggleOutcome::Selected(self.images.len())
    }

    /// Produce the ordered selection once exactly `required` images are picked.
    ///
    /// # Errors
    /// Returns `SelectionError::Incomplete` naming how many images are missing,
    /// or the validation error of `OrderedSelection::new` for an empty reference.
    pub fn finalize(&self) -> Result<OrderedSelection, SelectionError> {
        match self.state() {
            SelectionState::Complete => OrderedSelection::new(self.images.clone(), self.required),
            SelectionState::Empty | SelectionState::Partial(_) => {
                Err(SelectionError::Incomplete {
                    missing: self.remaining(),
                })
            }
        }
    }

    pub fn reset(&mut self) {
        self.images.clear();
    }

    #[must_use]
    pub fn state(&self) -> SelectionState {
        match self.images.len() {
            0 => SelectionState::Empty,
            n if n < self.required.get() => SelectionState::Partial(n),
            _ => SelectionState::Complete,
        }
    }

    /// 1-based position of an image, used for the order badge on a grid cell.
    #[must_use]
    pub fn position_of(&self, image: &str) -> Option<usize> {
        self.images
            .iter()
            .position(|selected| selected == image)
            .map(|index| index + 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.required.get().saturating_sub(self.images.len())
    }

    #[must_use]
    pub const fn required(&self) -> RequiredCount {
        self.required
    }

    #[must_use]
    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }
}

/// A complete, duplicate-free ordered pick: the plaintext graphical credential.
#[derive(Clone, PartialEq, Eq)]
pub struct OrderedSelection {
    images: Vec<ImageReference>,
}

impl OrderedSelection {
    /// Validate a submitted sequence against the required count.
    ///
    /// # Errors
    /// Returns an error when the length differs from `required`, an element is
    /// empty, or an image appears twice.
    pub fn new(images: Vec<ImageReference>, required: RequiredCount) -> Result<Self, SelectionError> {
        if images.len() != required.get() {
            return Err(SelectionError::WrongLength {
                expected: required.get(),
                actual: images.len(),
            });
        }

        for (index, image) in images.iter().enumerate() {
            if image.is_empty() {
                return Err(SelectionError::EmptyImage { position: index + 1 });
            }
            if images[..index].contains(image) {
                return Err(SelectionError::Duplicate { position: index + 1 });
            }
        }

        Ok(Self { images })
    }

    #[must_use]
    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

// Plaintext credential; never print the references.
impl std::fmt::Debug for OrderedSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedSelection")
            .field("len", &self.images.len())
            .finish()
    }
}
