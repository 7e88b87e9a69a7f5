//! Stylesheets shared by the integration suites.

/// Greets `$who` and reports the number of `item` elements, as text.
pub const GREETING: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:output method="text"/>
    <xsl:param name="who" select="'world'"/>
    <xsl:template match="/">Hello <xsl:value-of select="$who"/> (<xsl:value-of select="count(//item)"/>)</xsl:template>
</xsl:stylesheet>"#;

/// Renders a list of items as an XML report.
pub const REPORT: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:output method="xml" indent="yes"/>
    <xsl:template match="/list">
        <report count="{count(item)}">
            <xsl:apply-templates select="item">
                <xsl:sort select="@rank" data-type="number"/>
            </xsl:apply-templates>
        </report>
    </xsl:template>
    <xsl:template match="item">
        <entry rank="{@rank}"><xsl:value-of select="."/></entry>
    </xsl:template>
</xsl:stylesheet>"#;

pub const REPORT_DATA: &str = r#"<list><item rank="3">gamma</item><item rank="1">alpha</item><item rank="2">beta</item></list>"#;

/// Calls itself without end.
pub const RUNAWAY: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
    <xsl:template name="again"><xsl:call-template name="again"/></xsl:template>
    <xsl:template match="/"><start><xsl:call-template name="again"/></start></xsl:template>
</xsl:stylesheet>"#;
