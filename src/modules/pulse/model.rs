pub struct InsertPulse {
    pub author_id: String,
    pub media_url: String,
    pub caption: String,
}
